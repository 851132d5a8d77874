//! Read-only projections used by the dashboards

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::record::{Record, RecordStatus};

/// Library categories offered when the API has none to list.
pub const DEFAULT_CATEGORIES: &[&str] = &["notes", "past-papers", "guides", "books", "presentations"];

/// Library subjects offered when the API has none to list.
pub const DEFAULT_SUBJECTS: &[&str] = &[
    "mathematics",
    "physics",
    "biology",
    "chemistry",
    "english",
    "history",
];

/// Counters shown at the top of the student and tutor dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    /// `pending` and `pending_payment`
    pub pending: usize,
    pub completed: usize,
    /// Sum of the amounts of completed records
    pub earnings: f64,
    /// Distinct non-empty subjects
    pub subjects: usize,
}

impl DashboardStats {
    pub fn from_records(records: &[Record]) -> Self {
        let mut subjects = BTreeSet::new();
        let mut stats = DashboardStats {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            if record.status().is_pending() {
                stats.pending += 1;
            }
            if record.status() == RecordStatus::Completed {
                stats.completed += 1;
                stats.earnings += record.amount();
            }
            if let Some(subject) = record.get_str("subject").map(str::trim) {
                if !subject.is_empty() {
                    subjects.insert(subject.to_lowercase());
                }
            }
        }

        stats.subjects = subjects.len();
        stats
    }
}

/// Payments listed on a report.
pub const REPORT_LATEST_PAYMENTS: usize = 5;

/// One paid assignment as shown on a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub record_id: Option<String>,
    pub owner_key: String,
    pub title: Option<String>,
    pub amount: f64,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Admin summary over every assignment.
///
/// An assignment counts as a payment once the provider answered
/// `succeeded` for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    pub total_assignments: usize,
    /// Distinct owners with at least one assignment
    pub total_owners: usize,
    pub total_payments: usize,
    /// Newest payment first
    pub latest_payments: Vec<PaymentSummary>,
    pub generated_at: DateTime<Utc>,
}

impl ReportSnapshot {
    pub fn from_records(records: &[Record], generated_at: DateTime<Utc>) -> Self {
        let owners: BTreeSet<&str> = records
            .iter()
            .map(|r| r.owner_key.as_str())
            .filter(|o| !o.trim().is_empty())
            .collect();

        let mut paid: Vec<&Record> = records
            .iter()
            .filter(|r| r.get_str("paymentOutcome") == Some("succeeded"))
            .collect();
        let total_payments = paid.len();
        paid.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let latest_payments = paid
            .into_iter()
            .take(REPORT_LATEST_PAYMENTS)
            .map(|r| PaymentSummary {
                record_id: r.id.clone(),
                owner_key: r.owner_key.clone(),
                title: r.title().map(str::to_string),
                amount: r.amount(),
                paid_at: r.updated_at,
            })
            .collect();

        Self {
            total_assignments: records.len(),
            total_owners: owners.len(),
            total_payments,
            latest_payments,
            generated_at,
        }
    }
}

/// Newest first.
pub fn recent(records: &[Record], limit: usize) -> Vec<&Record> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

/// Most downloaded first.
pub fn popular(records: &[Record], limit: usize) -> Vec<&Record> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(r.get_u64("downloads").unwrap_or(0)));
    sorted.truncate(limit);
    sorted
}

/// Human readable size, two decimals at most (`1.5 KB`, `2.4 MB`).
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
