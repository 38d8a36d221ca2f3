use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use sqlx::SqlitePool;

use crate::anonymize::{anonymize_subject, anonymize_subject_in_tx, AnonymizationKind};
use crate::consent::append_activity;
use crate::error::Result;
use crate::models::{
    ActivityType, ConsentType, DataSubject, DataSubjectRequest, RequestStatus, RequestType,
    WorkflowTemplate,
};
use crate::report::{ReportRow, RetentionReport};
use crate::workflow::WorkflowService;

/// Retention classification of a subject at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Active,
    ExpiringSoon { days_left: i64 },
    Expired,
}

/// Pure classification against the retention deadline. Expiry strictly
/// before `now` is expired; strictly after `now` but inside the lookahead
/// window is expiring soon; anything else, including no deadline at all,
/// is active.
pub fn classify(
    data_expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookahead_days: i64,
) -> Disposition {
    match data_expiry_date {
        Some(expiry) if expiry < now => Disposition::Expired,
        Some(expiry) if expiry > now && expiry <= now + Duration::days(lookahead_days) => {
            Disposition::ExpiringSoon {
                days_left: (expiry - now).num_days(),
            }
        }
        _ => Disposition::Active,
    }
}

/// Marketing consent decays independently of the retention deadline: a
/// granted consent older than the configured lifetime is stale and gets
/// revoked, never anonymized.
pub fn marketing_consent_is_stale(
    subject: &DataSubject,
    now: DateTime<Utc>,
    lifetime_days: i64,
) -> bool {
    subject.marketing_consent
        && subject
            .marketing_consent_date
            .is_some_and(|granted| granted < now - Duration::days(lifetime_days))
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub consent_lifetime_days: i64,
    pub request_grace_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            consent_lifetime_days: 730, // 2 years
            request_grace_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionOptions {
    pub dry_run: bool,
    pub generate_report: bool,
    pub notify_expiring: bool,
    pub days_before_expiry: i64,
    pub report_dir: PathBuf,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            generate_report: false,
            notify_expiring: false,
            days_before_expiry: 30,
            report_dir: PathBuf::from("reports"),
        }
    }
}

/// The daily retention batch. Processes expired subjects, stale marketing
/// consent, expiring-soon notifications, and overdue deletion requests, in
/// that fixed order, with every record fault-isolated from the rest.
pub struct RetentionService {
    pool: SqlitePool,
    config: RetentionConfig,
    workflows: WorkflowService,
}

impl RetentionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, RetentionConfig::default())
    }

    pub fn with_config(pool: SqlitePool, config: RetentionConfig) -> Self {
        let workflows = WorkflowService::new(pool.clone());
        Self {
            pool,
            config,
            workflows,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>, options: &RetentionOptions) -> Result<RetentionReport> {
        let mut report = RetentionReport {
            dry_run: options.dry_run,
            ..RetentionReport::default()
        };
        if options.dry_run {
            warn!("DRY RUN MODE - no data will be modified");
        }

        let organizations = self.organization_names().await?;

        self.process_expired_subjects(now, options, &organizations, &mut report)
            .await?;
        self.revoke_stale_marketing_consent(now, options, &mut report)
            .await?;
        self.process_expiring_subjects(now, options, &organizations, &mut report)
            .await?;
        self.process_deletion_requests(now, options, &mut report)
            .await?;

        if options.generate_report {
            match report.write_csv(&options.report_dir, now) {
                Ok(path) => info!("Generated retention report: {}", path.display()),
                Err(e) => {
                    error!("Error generating retention report: {e}");
                    report.errors += 1;
                }
            }
        }

        info!(
            "Retention batch finished: {} expired, {} expiring, {} anonymized, {} consents revoked, \
             {} notification workflows, {} requests completed, {} requests rejected, {} errors",
            report.expired_subjects,
            report.expiring_subjects,
            report.subjects_anonymized,
            report.consents_revoked,
            report.notification_workflows_created,
            report.requests_completed,
            report.requests_rejected,
            report.errors
        );
        Ok(report)
    }

    async fn organization_names(&self) -> Result<HashMap<i64, String>> {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM organizations")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Step 1: anonymize every subject whose retention deadline has passed,
    /// one transaction per subject.
    async fn process_expired_subjects(
        &self,
        now: DateTime<Utc>,
        options: &RetentionOptions,
        organizations: &HashMap<i64, String>,
        report: &mut RetentionReport,
    ) -> Result<()> {
        let expired = sqlx::query_as::<_, DataSubject>(
            "SELECT * FROM data_subjects WHERE data_expiry_date IS NOT NULL AND data_expiry_date < ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        report.expired_subjects = expired.len();
        info!("Found {} expired data subjects", expired.len());

        for subject in &expired {
            let org_name = organizations
                .get(&subject.organization_id)
                .map(String::as_str)
                .unwrap_or("unknown");
            report
                .rows
                .push(ReportRow::from_subject(subject, org_name, "EXPIRED".into()));

            if options.dry_run {
                report.subjects_anonymized += 1;
                continue;
            }
            match anonymize_subject(&self.pool, subject, AnonymizationKind::Expired, now).await {
                Ok(_) => report.subjects_anonymized += 1,
                Err(e) => {
                    error!("Error processing expired subject {}: {e}", subject.id);
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Step 2: revoke marketing consent that outlived the consent lifetime.
    async fn revoke_stale_marketing_consent(
        &self,
        now: DateTime<Utc>,
        options: &RetentionOptions,
        report: &mut RetentionReport,
    ) -> Result<()> {
        let cutoff = now - Duration::days(self.config.consent_lifetime_days);
        let stale = sqlx::query_as::<_, DataSubject>(
            r#"
            SELECT * FROM data_subjects
            WHERE marketing_consent = 1
              AND marketing_consent_date IS NOT NULL
              AND marketing_consent_date < ?
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        if !stale.is_empty() {
            info!("Found {} stale marketing consent records", stale.len());
        }

        for subject in &stale {
            if options.dry_run {
                report.consents_revoked += 1;
                continue;
            }
            match self.revoke_marketing_consent(subject, now).await {
                Ok(()) => report.consents_revoked += 1,
                Err(e) => {
                    error!(
                        "Error revoking stale consent for subject {}: {e}",
                        subject.id
                    );
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn revoke_marketing_consent(&self, subject: &DataSubject, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE data_subjects SET marketing_consent = 0, marketing_consent_date = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(subject.id)
        .execute(&mut *tx)
        .await?;
        append_activity(
            &mut tx,
            subject.id,
            ActivityType::Revoke,
            Some(ConsentType::Marketing),
            "Automatically expired by data retention process",
            None,
            None,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Step 3: list subjects expiring inside the lookahead window and, when
    /// requested, start one notification workflow per subject from the
    /// organization's active `retention_notification` template.
    async fn process_expiring_subjects(
        &self,
        now: DateTime<Utc>,
        options: &RetentionOptions,
        organizations: &HashMap<i64, String>,
        report: &mut RetentionReport,
    ) -> Result<()> {
        let window_end = now + Duration::days(options.days_before_expiry);
        let expiring = sqlx::query_as::<_, DataSubject>(
            "SELECT * FROM data_subjects WHERE data_expiry_date > ? AND data_expiry_date <= ?",
        )
        .bind(now)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await?;

        report.expiring_subjects = expiring.len();
        info!(
            "Found {} data subjects expiring in the next {} days",
            expiring.len(),
            options.days_before_expiry
        );

        for subject in &expiring {
            let days_left = match classify(subject.data_expiry_date, now, options.days_before_expiry)
            {
                Disposition::ExpiringSoon { days_left } => days_left,
                // Concurrent edits between the two queries could move a
                // subject out of the window; keep the row honest.
                _ => continue,
            };
            let org_name = organizations
                .get(&subject.organization_id)
                .map(String::as_str)
                .unwrap_or("unknown");
            report.rows.push(ReportRow::from_subject(
                subject,
                org_name,
                format!("EXPIRING IN {days_left} DAYS"),
            ));
        }

        if !options.notify_expiring || options.dry_run {
            return Ok(());
        }

        for (org_id, org_name) in organizations {
            let org_subjects: Vec<_> = expiring
                .iter()
                .filter(|s| s.organization_id == *org_id)
                .collect();
            if org_subjects.is_empty() {
                continue;
            }

            let template = sqlx::query_as::<_, WorkflowTemplate>(
                r#"
                SELECT * FROM workflow_templates
                WHERE organization_id = ? AND workflow_type = 'retention_notification' AND is_active = 1
                ORDER BY id LIMIT 1
                "#,
            )
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(template) = template else {
                warn!(
                    "No active retention notification workflow template found for organization {}. Skipping notifications.",
                    org_name
                );
                continue;
            };

            for subject in org_subjects {
                match self.start_notification_workflow(&template, subject).await {
                    Ok(()) => report.notification_workflows_created += 1,
                    Err(e) => {
                        error!(
                            "Error creating notification workflow for subject {}: {e}",
                            subject.id
                        );
                        report.errors += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn start_notification_workflow(
        &self,
        template: &WorkflowTemplate,
        subject: &DataSubject,
    ) -> Result<()> {
        let instance = self.workflows.instantiate(template.id, Some(subject.id), None).await?;
        self.workflows.start(instance.id).await?;
        info!(
            "Created notification workflow {} for subject {}",
            instance.id, subject.id
        );
        Ok(())
    }

    /// Step 4: reconcile erasure requests past the grace period. A matching
    /// subject is anonymized and the request completed in one transaction;
    /// an unmatched request is terminally rejected.
    async fn process_deletion_requests(
        &self,
        now: DateTime<Utc>,
        options: &RetentionOptions,
        report: &mut RetentionReport,
    ) -> Result<()> {
        let grace_cutoff = now - Duration::days(self.config.request_grace_days);
        let pending = sqlx::query_as::<_, DataSubjectRequest>(
            "SELECT * FROM data_subject_requests WHERE request_type = ? AND status = ? AND date_received < ?",
        )
        .bind(RequestType::Erasure)
        .bind(RequestStatus::New)
        .bind(grace_cutoff)
        .fetch_all(&self.pool)
        .await?;

        if !pending.is_empty() {
            info!("Found {} pending deletion requests", pending.len());
        }

        for request in &pending {
            let subject = sqlx::query_as::<_, DataSubject>(
                "SELECT * FROM data_subjects WHERE email = ? LIMIT 1",
            )
            .bind(&request.data_subject_email)
            .fetch_optional(&self.pool)
            .await?;

            match subject {
                Some(subject) => {
                    if options.dry_run {
                        report.requests_completed += 1;
                        continue;
                    }
                    match self.fulfill_deletion_request(request, &subject, now).await {
                        Ok(()) => report.requests_completed += 1,
                        Err(e) => {
                            error!("Error processing deletion request {}: {e}", request.id);
                            report.errors += 1;
                        }
                    }
                }
                None => {
                    warn!(
                        "No data subject found for email {}",
                        request.data_subject_email
                    );
                    if options.dry_run {
                        report.requests_rejected += 1;
                        continue;
                    }
                    match self.reject_deletion_request(request, now).await {
                        Ok(()) => report.requests_rejected += 1,
                        Err(e) => {
                            error!("Error rejecting deletion request {}: {e}", request.id);
                            report.errors += 1;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn fulfill_deletion_request(
        &self,
        request: &DataSubjectRequest,
        subject: &DataSubject,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        anonymize_subject_in_tx(&mut tx, subject, AnonymizationKind::Deleted, now).await?;

        let notes = append_note(&request.notes, "Automatically processed by data retention job");
        sqlx::query(
            "UPDATE data_subject_requests SET status = ?, completed_date = ?, notes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(RequestStatus::Completed)
        .bind(now)
        .bind(notes)
        .bind(now)
        .bind(request.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reject_deletion_request(
        &self,
        request: &DataSubjectRequest,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let notes = append_note(&request.notes, "No matching data subject found");
        sqlx::query(
            "UPDATE data_subject_requests SET status = ?, notes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(RequestStatus::Rejected)
        .bind(notes)
        .bind(now)
        .bind(request.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn append_note(existing: &str, note: &str) -> String {
    if existing.is_empty() {
        note.to_string()
    } else {
        format!("{existing}\n{note}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject_with_marketing_consent(granted: Option<DateTime<Utc>>) -> DataSubject {
        let now = Utc::now();
        DataSubject {
            id: 1,
            organization_id: 1,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@example.com".into(),
            phone: String::new(),
            marketing_consent: granted.is_some(),
            marketing_consent_date: granted,
            data_processing_consent: false,
            data_processing_consent_date: None,
            cookie_consent: false,
            cookie_consent_date: None,
            data_expiry_date: None,
            privacy_notice_version: None,
            privacy_notice_accepted_date: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_deadline_is_active() {
        let now = Utc::now();
        assert_eq!(classify(None, now, 30), Disposition::Active);
    }

    #[test]
    fn past_deadline_is_expired() {
        let now = Utc::now();
        assert_eq!(
            classify(Some(now - Duration::seconds(1)), now, 30),
            Disposition::Expired
        );
    }

    #[test]
    fn deadline_inside_lookahead_is_expiring_soon() {
        let now = Utc::now();
        assert_eq!(
            classify(Some(now + Duration::days(15)), now, 30),
            Disposition::ExpiringSoon { days_left: 15 }
        );
    }

    #[test]
    fn deadline_at_window_edge_is_expiring_soon() {
        let now = Utc::now();
        assert_eq!(
            classify(Some(now + Duration::days(30)), now, 30),
            Disposition::ExpiringSoon { days_left: 30 }
        );
    }

    #[test]
    fn deadline_beyond_lookahead_is_active() {
        let now = Utc::now();
        assert_eq!(
            classify(Some(now + Duration::days(45)), now, 30),
            Disposition::Active
        );
    }

    #[test]
    fn deadline_exactly_now_is_active() {
        let now = Utc::now();
        assert_eq!(classify(Some(now), now, 30), Disposition::Active);
    }

    #[test]
    fn consent_older_than_lifetime_is_stale() {
        let now = Utc::now();
        let subject = subject_with_marketing_consent(Some(now - Duration::days(731)));
        assert!(marketing_consent_is_stale(&subject, now, 730));
    }

    #[test]
    fn consent_within_lifetime_is_not_stale() {
        let now = Utc::now();
        let subject = subject_with_marketing_consent(Some(now - Duration::days(729)));
        assert!(!marketing_consent_is_stale(&subject, now, 730));
    }

    #[test]
    fn absent_consent_is_never_stale() {
        let now = Utc::now();
        let subject = subject_with_marketing_consent(None);
        assert!(!marketing_consent_is_stale(&subject, now, 730));
    }
}
