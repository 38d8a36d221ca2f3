pub mod anonymize;
pub mod consent;
pub mod error;
pub mod models;
pub mod report;
pub mod requests;
pub mod retention;
pub mod routes;
pub mod subjects;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// In-memory database with the schema applied. A single connection is
    /// required: every connection to `sqlite::memory:` is its own database.
    pub async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory database");
        sqlx::migrate!()
            .run(&pool)
            .await
            .expect("failed to run migrations");
        pool
    }

    pub async fn insert_organization(pool: &SqlitePool, name: &str) -> i64 {
        let now = Utc::now();
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO organizations (name, created_at, updated_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .expect("failed to insert organization")
    }

    pub async fn insert_subject(
        pool: &SqlitePool,
        organization_id: i64,
        email: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> i64 {
        let now = Utc::now();
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO data_subjects
                (organization_id, first_name, last_name, email, phone,
                 marketing_consent, marketing_consent_date,
                 data_processing_consent, data_processing_consent_date,
                 cookie_consent, data_expiry_date, created_at, updated_at)
            VALUES (?, 'Jane', 'Doe', ?, '+33 6 00 00 00 00', 1, ?, 1, ?, 0, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(organization_id)
        .bind(email)
        .bind(now - Duration::days(10))
        .bind(now - Duration::days(10))
        .bind(expiry)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .expect("failed to insert data subject")
    }
}
