//! Catalog of data sources a file can be routed to.
//!
//! Each source has an option value (what the user picks and what prefixes the
//! blob path) and a data id (what the notebook lookup matches against).

/// A selectable destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSource {
    pub option: &'static str,
    pub data_id: &'static str,
    pub label: &'static str,
}

/// Sources with a matching notebook. Data ids are matched exactly.
pub const CATALOG: &[DataSource] = &[
    DataSource { option: "google_ads", data_id: "Google", label: "Google Ads" },
    DataSource { option: "meta", data_id: "Meta", label: "Meta" },
    DataSource { option: "neilsen", data_id: "Neilsen", label: "Neilsen" },
    DataSource { option: "Amazon", data_id: "Amazon", label: "Amazon" },
    DataSource { option: "Walmart", data_id: "Walmart", label: "Walmart" },
    DataSource { option: "Circana", data_id: "Circana", label: "Circana" },
    DataSource { option: "LinkedIn", data_id: "LinkedIn", label: "LinkedIn" },
    DataSource { option: "Tiktok", data_id: "Tiktok", label: "Tiktok" },
    DataSource { option: "Snapchat", data_id: "Snapchat", label: "Snapchat" },
    DataSource { option: "Youtube", data_id: "Youtube", label: "Youtube" },
    DataSource { option: "Twitter", data_id: "Twitter", label: "Twitter" },
];

/// Looks up a source by option value or data id.
pub fn lookup(value: &str) -> Option<&'static DataSource> {
    CATALOG
        .iter()
        .find(|s| s.option == value || s.data_id == value)
}

/// Resolves user input to `(option, data_id)`.
///
/// Unknown input is kept verbatim for both; the execute step rejects it.
pub fn resolve(value: &str) -> (String, String) {
    match lookup(value) {
        Some(source) => (source.option.to_string(), source.data_id.to_string()),
        None => (value.to_string(), value.to_string()),
    }
}

/// Whether a notebook exists for this data id. Case-sensitive.
pub fn is_allowed(data_id: &str) -> bool {
    CATALOG.iter().any(|s| s.data_id == data_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_option_and_data_id() {
        assert_eq!(resolve("google_ads"), ("google_ads".to_string(), "Google".to_string()));
        assert_eq!(resolve("Google"), ("google_ads".to_string(), "Google".to_string()));
        assert_eq!(resolve("Tiktok"), ("Tiktok".to_string(), "Tiktok".to_string()));
    }

    #[test]
    fn unknown_input_is_kept_verbatim() {
        assert_eq!(resolve("Pinterest"), ("Pinterest".to_string(), "Pinterest".to_string()));
    }

    #[test]
    fn allow_list_is_case_sensitive() {
        assert!(is_allowed("Google"));
        assert!(!is_allowed("google"));
        assert!(!is_allowed("google_ads"));
        assert!(!is_allowed("Pinterest"));
    }
}
