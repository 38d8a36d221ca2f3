use chrono::{DateTime, Utc};
use log::info;
use sqlx::{SqliteConnection, SqlitePool};

use crate::consent::append_activity;
use crate::error::Result;
use crate::models::{ActivityType, DataSubject};

/// Which trigger produced the redaction. The two variants differ in their
/// placeholder text and in whether the synthesized email keeps a traceable
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymizationKind {
    /// Retention expiry: `[EXPIRED]` fields, `expired-{id}@example.com`.
    Expired,
    /// Deletion-request fulfillment: `[DELETED]` fields, no identifier in
    /// the email local part.
    Deleted,
}

impl AnonymizationKind {
    pub fn placeholder(self) -> &'static str {
        match self {
            AnonymizationKind::Expired => "[EXPIRED]",
            AnonymizationKind::Deleted => "[DELETED]",
        }
    }

    pub fn email(self, subject_id: i64) -> String {
        match self {
            AnonymizationKind::Expired => format!("expired-{subject_id}@example.com"),
            AnonymizationKind::Deleted => "deleted@example.com".to_string(),
        }
    }

    fn subject_note(self) -> &'static str {
        match self {
            AnonymizationKind::Expired => "Data expired due to retention policy",
            AnonymizationKind::Deleted => "Data deleted per user request",
        }
    }

    fn activity_note(self) -> &'static str {
        match self {
            AnonymizationKind::Expired => "Automated anonymization due to expiry date",
            AnonymizationKind::Deleted => "Anonymization on fulfilled deletion request",
        }
    }
}

/// An already-redacted subject carries one of the placeholder names; the
/// engine detects this instead of re-applying, so document annotations and
/// ledger entries are emitted exactly once.
pub fn is_anonymized(subject: &DataSubject) -> bool {
    subject.first_name == AnonymizationKind::Expired.placeholder()
        || subject.first_name == AnonymizationKind::Deleted.placeholder()
}

/// Anonymize one subject in its own transaction.
pub async fn anonymize_subject(
    pool: &SqlitePool,
    subject: &DataSubject,
    kind: AnonymizationKind,
    now: DateTime<Utc>,
) -> Result<DataSubject> {
    if is_anonymized(subject) {
        return Ok(subject.clone());
    }
    let mut tx = pool.begin().await?;
    let updated = anonymize_subject_in_tx(&mut tx, subject, kind, now).await?;
    tx.commit().await?;
    Ok(updated)
}

/// The redaction itself, composable into a larger transaction (the deletion
/// request path commits the request update and the anonymization together).
/// Replaces the identifying fields with deterministic placeholders, clears
/// all consent flags and the expiry date, appends a redaction annotation to
/// every document referencing the subject, and writes one `data_deleted`
/// ledger entry.
pub async fn anonymize_subject_in_tx(
    conn: &mut SqliteConnection,
    subject: &DataSubject,
    kind: AnonymizationKind,
    now: DateTime<Utc>,
) -> Result<DataSubject> {
    if is_anonymized(subject) {
        return Ok(subject.clone());
    }

    info!("Anonymizing subject {} ({:?})", subject.id, kind);

    let placeholder = kind.placeholder();
    sqlx::query(
        r#"
        UPDATE data_subjects
        SET first_name = ?, last_name = ?, phone = ?, email = ?,
            marketing_consent = 0, marketing_consent_date = NULL,
            data_processing_consent = 0, data_processing_consent_date = NULL,
            cookie_consent = 0, cookie_consent_date = NULL,
            data_expiry_date = NULL,
            notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(placeholder)
    .bind(placeholder)
    .bind(placeholder)
    .bind(kind.email(subject.id))
    .bind(kind.subject_note())
    .bind(now)
    .bind(subject.id)
    .execute(&mut *conn)
    .await?;

    // Cascade: annotate, never overwrite, dependent documents.
    let annotation = format!(
        "\n\nNOTE: This document relates to a data subject that has been anonymized on {} due to data retention policy.",
        now.format("%Y-%m-%d")
    );
    sqlx::query("UPDATE documents SET content = content || ?, updated_at = ? WHERE data_subject_id = ?")
        .bind(&annotation)
        .bind(now)
        .bind(subject.id)
        .execute(&mut *conn)
        .await?;

    append_activity(
        conn,
        subject.id,
        ActivityType::DataDeleted,
        None,
        kind.activity_note(),
        None,
        None,
        now,
    )
    .await?;

    let updated = sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
        .bind(subject.id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_organization, insert_subject, test_pool};
    use chrono::Duration;

    async fn load_subject(pool: &SqlitePool, id: i64) -> DataSubject {
        sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn insert_document(pool: &SqlitePool, org: i64, subject_id: i64) -> i64 {
        let now = Utc::now();
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO documents (organization_id, data_subject_id, title, content, created_at, updated_at)
            VALUES (?, ?, 'Consent form', 'Signed consent form contents.', ?, ?)
            RETURNING id
            "#,
        )
        .bind(org)
        .bind(subject_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn expired_variant_redacts_and_keeps_traceable_email() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme").await;
        let expiry = Utc::now() - Duration::days(1);
        let id = insert_subject(&pool, org, "jane@example.com", Some(expiry)).await;
        let subject = load_subject(&pool, id).await;

        let updated = anonymize_subject(&pool, &subject, AnonymizationKind::Expired, Utc::now())
            .await
            .unwrap();

        assert_eq!(updated.first_name, "[EXPIRED]");
        assert_eq!(updated.email, format!("expired-{id}@example.com"));
        assert!(!updated.marketing_consent);
        assert!(!updated.data_processing_consent);
        assert!(!updated.cookie_consent);
        assert!(updated.marketing_consent_date.is_none());
        assert!(updated.data_expiry_date.is_none());
    }

    #[tokio::test]
    async fn deleted_variant_leaves_no_identifier_in_email() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme").await;
        let id = insert_subject(&pool, org, "jane@example.com", None).await;
        let subject = load_subject(&pool, id).await;

        let updated = anonymize_subject(&pool, &subject, AnonymizationKind::Deleted, Utc::now())
            .await
            .unwrap();

        assert_eq!(updated.first_name, "[DELETED]");
        assert_eq!(updated.email, "deleted@example.com");
        assert!(!updated.email.contains(&id.to_string()));
        assert!(!updated.email.contains("jane"));
    }

    #[tokio::test]
    async fn anonymization_is_idempotent_for_both_variants() {
        for kind in [AnonymizationKind::Expired, AnonymizationKind::Deleted] {
            let pool = test_pool().await;
            let org = insert_organization(&pool, "Acme").await;
            let id = insert_subject(&pool, org, "jane@example.com", None).await;
            insert_document(&pool, org, id).await;

            let subject = load_subject(&pool, id).await;
            let first = anonymize_subject(&pool, &subject, kind, Utc::now())
                .await
                .unwrap();
            let second = anonymize_subject(&pool, &first, kind, Utc::now())
                .await
                .unwrap();

            assert_eq!(first.first_name, second.first_name);
            assert_eq!(first.email, second.email);

            // Exactly one annotation and one ledger entry despite two calls.
            let content = sqlx::query_scalar::<_, String>(
                "SELECT content FROM documents WHERE data_subject_id = ?",
            )
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(content.matches("NOTE: This document relates").count(), 1);

            let ledger_entries = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM consent_activities WHERE data_subject_id = ? AND activity_type = 'data_deleted'",
            )
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(ledger_entries, 1);
        }
    }

    #[tokio::test]
    async fn documents_are_annotated_not_overwritten() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme").await;
        let id = insert_subject(&pool, org, "jane@example.com", None).await;
        insert_document(&pool, org, id).await;
        let subject = load_subject(&pool, id).await;

        anonymize_subject(&pool, &subject, AnonymizationKind::Expired, Utc::now())
            .await
            .unwrap();

        let content = sqlx::query_scalar::<_, String>(
            "SELECT content FROM documents WHERE data_subject_id = ?",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(content.starts_with("Signed consent form contents."));
        assert!(content.contains("has been anonymized on"));
    }
}
