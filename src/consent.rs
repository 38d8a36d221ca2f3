use chrono::{DateTime, Utc};
use log::info;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{ComplianceError, Result};
use crate::models::{ActivityType, ConsentActivity, ConsentType, DataSubject};

/// Consent ledger: the append-only log of consent state changes and the
/// source of truth for "is consent currently valid" queries.
pub struct ConsentService {
    pool: SqlitePool,
}

impl ConsentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a grant or revocation for one consent type. Updates the
    /// subject's flag and its paired timestamp together with the ledger
    /// entry in a single transaction.
    pub async fn record_consent(
        &self,
        subject_id: i64,
        consent_type: ConsentType,
        granted: bool,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<ConsentActivity> {
        info!(
            "Recording consent for subject {}: {:?} granted={}",
            subject_id, consent_type, granted
        );

        let subject = sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("data subject {subject_id}")))?;

        let now = Utc::now();
        let (flag_column, date_column) = consent_columns(consent_type);
        let consent_date = granted.then_some(now);

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "UPDATE data_subjects SET {flag_column} = ?, {date_column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(granted)
        .bind(consent_date)
        .bind(now)
        .bind(subject.id)
        .execute(&mut *tx)
        .await?;

        let activity_type = if granted {
            ActivityType::Grant
        } else {
            ActivityType::Revoke
        };
        let activity_id = append_activity(
            &mut tx,
            subject.id,
            activity_type,
            Some(consent_type),
            "",
            ip_address,
            user_agent,
            now,
        )
        .await?;

        tx.commit().await?;

        let activity =
            sqlx::query_as::<_, ConsentActivity>("SELECT * FROM consent_activities WHERE id = ?")
                .bind(activity_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(activity)
    }

    /// The subject's full ledger, most recent first.
    pub async fn activities_for_subject(&self, subject_id: i64) -> Result<Vec<ConsentActivity>> {
        let activities = sqlx::query_as::<_, ConsentActivity>(
            "SELECT * FROM consent_activities WHERE data_subject_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(activities)
    }
}

fn consent_columns(consent_type: ConsentType) -> (&'static str, &'static str) {
    match consent_type {
        ConsentType::Marketing => ("marketing_consent", "marketing_consent_date"),
        ConsentType::DataProcessing => ("data_processing_consent", "data_processing_consent_date"),
        ConsentType::Cookie => ("cookie_consent", "cookie_consent_date"),
    }
}

/// Append one ledger entry. Shared by the consent service, the anonymization
/// engine, and the retention batch so every state transition lands in the
/// same log, inside whatever transaction the caller holds.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn append_activity(
    conn: &mut SqliteConnection,
    subject_id: i64,
    activity_type: ActivityType,
    consent_type: Option<ConsentType>,
    notes: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO consent_activities
            (data_subject_id, activity_type, consent_type, notes, ip_address, user_agent, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(subject_id)
    .bind(activity_type)
    .bind(consent_type)
    .bind(notes)
    .bind(ip_address)
    .bind(user_agent)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_organization, insert_subject, test_pool};

    #[tokio::test]
    async fn grant_sets_flag_date_and_ledger_entry() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme Legal").await;
        let subject_id = insert_subject(&pool, org, "jane@example.com", None).await;
        let service = ConsentService::new(pool.clone());

        let activity = service
            .record_consent(
                subject_id,
                ConsentType::Cookie,
                true,
                Some("203.0.113.7"),
                Some("integration-test"),
            )
            .await
            .unwrap();

        assert_eq!(activity.activity_type, ActivityType::Grant);
        assert_eq!(activity.consent_type, Some(ConsentType::Cookie));
        assert_eq!(activity.ip_address.as_deref(), Some("203.0.113.7"));

        let subject = sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
            .bind(subject_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(subject.cookie_consent);
        assert!(subject.cookie_consent_date.is_some());
    }

    #[tokio::test]
    async fn revoke_clears_flag_and_date() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme Legal").await;
        let subject_id = insert_subject(&pool, org, "jane@example.com", None).await;
        let service = ConsentService::new(pool.clone());

        service
            .record_consent(subject_id, ConsentType::Marketing, false, None, None)
            .await
            .unwrap();

        let subject = sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
            .bind(subject_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!subject.marketing_consent);
        assert!(subject.marketing_consent_date.is_none());

        let activities = service.activities_for_subject(subject_id).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::Revoke);
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let pool = test_pool().await;
        let service = ConsentService::new(pool);

        let err = service
            .record_consent(9999, ConsentType::Marketing, true, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::NotFound(_)));
    }
}
