//! Tabular data as ordered, string-keyed records.

use serde::Serialize;
use serde_json::{Map, Value};

/// One row: column name to scalar cell value, in column order.
pub type Record = Map<String, Value>;

/// Rows sharing an ordered column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Record>,
}

/// A window of rows for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    /// 1-based page number, clamped to `total_pages`.
    pub number: usize,
    pub total_pages: usize,
    pub rows: &'a [Record],
}

impl Dataset {
    /// Builds records from positional cells. Missing cells become `""`,
    /// cells beyond the header are dropped.
    pub fn from_cells(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let records = rows
            .into_iter()
            .map(|cells| {
                let mut cells = cells.into_iter();
                columns
                    .iter()
                    .map(|column| {
                        let value = cells.next().unwrap_or_else(|| Value::String(String::new()));
                        (column.clone(), value)
                    })
                    .collect::<Record>()
            })
            .collect();

        Self {
            columns,
            rows: records,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Rows of page `number` (1-based). Out-of-range pages clamp to the
    /// first or last page; an empty dataset has a single empty page.
    pub fn page(&self, number: usize, per_page: usize) -> Page<'_> {
        let per_page = per_page.max(1);
        let total_pages = self.rows.len().div_ceil(per_page).max(1);
        let number = number.clamp(1, total_pages);
        let start = (number - 1) * per_page;
        let end = (start + per_page).min(self.rows.len());

        Page {
            number,
            total_pages,
            rows: &self.rows[start.min(end)..end],
        }
    }
}

/// Cell value as display text. Whole numbers print without a fraction.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// A named sheet of a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub dataset: Dataset,
}

/// All sheets of a parsed file, in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// The first sheet that has a header row.
    pub fn first_tabular(&self) -> Option<&Sheet> {
        self.sheets.iter().find(|s| !s.dataset.is_empty())
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(rows: usize) -> Dataset {
        Dataset::from_cells(
            vec!["Week".to_string(), "Spend".to_string()],
            (0..rows).map(|i| vec![json!(i), json!(i * 10)]).collect(),
        )
    }

    #[test]
    fn records_keep_column_order_and_fill_missing_cells() {
        let dataset = Dataset::from_cells(
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
            vec![vec![json!(1)], vec![json!(1), json!(2), json!(3), json!(4)]],
        );

        let keys: Vec<_> = dataset.rows()[0].keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(dataset.rows()[0]["c"], json!(""));
        assert_eq!(dataset.rows()[1].len(), 3);
    }

    #[test]
    fn pages_of_twenty() {
        let dataset = sample(45);

        let first = dataset.page(1, 20);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.rows.len(), 20);

        let last = dataset.page(3, 20);
        assert_eq!(last.rows.len(), 5);
        assert_eq!(last.rows[0]["Week"], json!(40));
    }

    #[test]
    fn page_numbers_clamp() {
        let dataset = sample(5);

        assert_eq!(dataset.page(0, 20).number, 1);
        assert_eq!(dataset.page(9, 20).number, 1);

        let empty = Dataset::default();
        let page = empty.page(1, 20);
        assert_eq!(page.total_pages, 1);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn cell_text_formats_scalars() {
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(12)), "12");
        assert_eq!(cell_text(&json!(12.0)), "12");
        assert_eq!(cell_text(&json!(1.25)), "1.25");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[test]
    fn first_tabular_skips_empty_sheets() {
        let workbook = Workbook {
            sheets: vec![
                Sheet {
                    name: "Cover".to_string(),
                    dataset: Dataset::default(),
                },
                Sheet {
                    name: "Data".to_string(),
                    dataset: sample(2),
                },
            ],
        };

        assert_eq!(workbook.first_tabular().map(|s| s.name.as_str()), Some("Data"));
        assert_eq!(workbook.sheet_names(), vec!["Cover", "Data"]);
        assert!(workbook.sheet("Missing").is_none());
    }
}
