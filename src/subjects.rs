use chrono::Utc;
use log::info;
use sqlx::SqlitePool;

use crate::error::{ComplianceError, Result};
use crate::models::{DataSubject, NewDataSubject};

/// Subject intake and lookup. Mutation beyond rectification happens through
/// the consent service and the retention batch, never here.
pub struct SubjectService {
    pool: SqlitePool,
}

impl SubjectService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewDataSubject) -> Result<DataSubject> {
        info!("Creating data subject for {}", input.email);
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO data_subjects
                (organization_id, first_name, last_name, email, phone,
                 data_expiry_date, privacy_notice_version, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.organization_id)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.data_expiry_date)
        .bind(&input.privacy_notice_version)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<DataSubject> {
        sqlx::query_as::<_, DataSubject>("SELECT * FROM data_subjects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("data subject {id}")))
    }

    pub async fn list(&self, organization_id: i64) -> Result<Vec<DataSubject>> {
        let subjects = sqlx::query_as::<_, DataSubject>(
            "SELECT * FROM data_subjects WHERE organization_id = ? ORDER BY created_at DESC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    /// Right to rectification: update identity fields only.
    pub async fn rectify(
        &self,
        id: i64,
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Result<DataSubject> {
        info!("Rectifying data for subject {}", id);
        let subject = self.get(id).await?;
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE data_subjects
            SET first_name = ?, last_name = ?, email = ?, phone = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(first_name.unwrap_or(subject.first_name))
        .bind(last_name.unwrap_or(subject.last_name))
        .bind(email.unwrap_or(subject.email))
        .bind(phone.unwrap_or(subject.phone))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_organization, test_pool};

    fn new_subject(org: i64, email: &str) -> NewDataSubject {
        NewDataSubject {
            organization_id: org,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: email.into(),
            phone: String::new(),
            data_expiry_date: None,
            privacy_notice_version: Some("1.2".into()),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn created_subject_starts_without_consent() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme").await;
        let service = SubjectService::new(pool);

        let subject = service.create(new_subject(org, "jane@example.com")).await.unwrap();
        assert!(!subject.marketing_consent);
        assert!(!subject.data_processing_consent);
        assert!(!subject.cookie_consent);
        assert!(subject.marketing_consent_date.is_none());
    }

    #[tokio::test]
    async fn rectification_updates_only_provided_fields() {
        let pool = test_pool().await;
        let org = insert_organization(&pool, "Acme").await;
        let service = SubjectService::new(pool);

        let subject = service.create(new_subject(org, "jane@example.com")).await.unwrap();
        let updated = service
            .rectify(subject.id, None, Some("Smith".into()), None, None)
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.last_name, "Smith");
        assert_eq!(updated.email, "jane@example.com");
    }
}
