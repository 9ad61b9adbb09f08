//! Upload totals and recent activity computed from job records.

use serde::Serialize;

use crate::storage::records::{JobRecord, RecordStatus};

/// Number of entries in `recent_uploads`.
const RECENT_UPLOADS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpload {
    pub file_name: String,
    pub file_size: String,
    pub time_ago: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_uploads: usize,
    /// Records with status 1.
    pub successful_uploads: usize,
    /// Records with status 0 (paused or never completed).
    pub failed_uploads: usize,
    /// Sum of `total_rows` across all records.
    pub data_processed: u64,
    pub recent_uploads: Vec<RecentUpload>,
}

impl DashboardMetrics {
    /// Aggregates `records` relative to `now` (unix seconds).
    pub fn from_records(records: &[JobRecord], now: i64) -> Self {
        let successful_uploads = records
            .iter()
            .filter(|r| r.status == RecordStatus::Completed)
            .count();

        let mut recent: Vec<&JobRecord> = records.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Self {
            total_uploads: records.len(),
            successful_uploads,
            failed_uploads: records.len() - successful_uploads,
            data_processed: records.iter().map(|r| r.total_rows).sum(),
            recent_uploads: recent
                .into_iter()
                .take(RECENT_UPLOADS)
                .map(|r| RecentUpload {
                    file_name: r.file_name.clone(),
                    file_size: r.file_size.clone(),
                    time_ago: time_ago(r.created_at, now),
                })
                .collect(),
        }
    }
}

/// Relative time such as "3 minutes ago" or "a day ago".
///
/// Each unit is used while the rounded value stays under its threshold
/// (44 s, 89 s, 44 min, 89 min, 21 h, 35 h, 25 d, 45 d, 10 months, 17 months).
pub fn time_ago(then: i64, now: i64) -> String {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 3_600.0;
    const DAY: f64 = 86_400.0;
    const MONTH: f64 = 30.436_875 * DAY;
    const YEAR: f64 = 12.0 * MONTH;

    let secs = (now - then).max(0) as f64;
    let in_unit = |unit: f64| (secs / unit).round() as i64;

    if in_unit(1.0) <= 44 {
        return "a few seconds ago".to_string();
    }
    if in_unit(1.0) <= 89 {
        return "a minute ago".to_string();
    }
    let minutes = in_unit(MINUTE);
    if minutes <= 44 {
        return format!("{} minutes ago", minutes);
    }
    if minutes <= 89 {
        return "an hour ago".to_string();
    }
    let hours = in_unit(HOUR);
    if hours <= 21 {
        return format!("{} hours ago", hours);
    }
    if hours <= 35 {
        return "a day ago".to_string();
    }
    let days = in_unit(DAY);
    if days <= 25 {
        return format!("{} days ago", days);
    }
    if days <= 45 {
        return "a month ago".to_string();
    }
    let months = in_unit(MONTH);
    if months <= 10 {
        return format!("{} months ago", months);
    }
    if months <= 17 {
        return "a year ago".to_string();
    }
    format!("{} years ago", in_unit(YEAR).max(2))
}
