use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::DataSubject;

/// One report row per expired-or-expiring subject.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub subject_id: i64,
    pub organization: String,
    pub full_name: String,
    pub email: String,
    pub status_label: String,
    pub expiry_date: String,
    pub data_processing_consent: bool,
    pub marketing_consent: bool,
    pub cookie_consent: bool,
    pub created_date: String,
}

impl ReportRow {
    pub fn from_subject(subject: &DataSubject, organization: &str, status_label: String) -> Self {
        Self {
            subject_id: subject.id,
            organization: organization.to_string(),
            full_name: subject.full_name(),
            email: subject.email.clone(),
            status_label,
            expiry_date: subject
                .data_expiry_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            data_processing_consent: subject.data_processing_consent,
            marketing_consent: subject.marketing_consent,
            cookie_consent: subject.cookie_consent,
            created_date: subject.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Aggregated outcome of one retention batch run. In dry-run mode the
/// counters describe what would have been done; `errors` counts per-record
/// failures that were logged and skipped.
#[derive(Debug, Default, Serialize)]
pub struct RetentionReport {
    pub dry_run: bool,
    pub expired_subjects: usize,
    pub expiring_subjects: usize,
    pub subjects_anonymized: usize,
    pub consents_revoked: usize,
    pub notification_workflows_created: usize,
    pub requests_completed: usize,
    pub requests_rejected: usize,
    pub errors: usize,
    pub rows: Vec<ReportRow>,
}

impl RetentionReport {
    /// Render the per-subject rows as a timestamped CSV file under `dir`.
    /// Returns the path of the written artifact.
    pub fn write_csv(&self, dir: &Path, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "data_retention_report_{}.csv",
            now.format("%Y%m%d_%H%M%S")
        ));

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record([
            "Subject ID",
            "Organization",
            "Name",
            "Email",
            "Status",
            "Expiry Date",
            "Data Processing Consent",
            "Marketing Consent",
            "Cookie Consent",
            "Created Date",
        ])?;
        for row in &self.rows {
            writer.write_record([
                row.subject_id.to_string(),
                row.organization.clone(),
                row.full_name.clone(),
                row.email.clone(),
                row.status_label.clone(),
                row.expiry_date.clone(),
                row.data_processing_consent.to_string(),
                row.marketing_consent.to_string(),
                row.cookie_consent.to_string(),
                row.created_date.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }
}
