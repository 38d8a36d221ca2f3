use chrono::{Duration, Utc};
use log::info;
use sqlx::SqlitePool;

use crate::error::{ComplianceError, Result};
use crate::models::{DataSubjectRequest, NewDataSubjectRequest, RequestStatus};

/// GDPR rights-request intake. The retention batch owns the automated
/// transitions for overdue erasure requests; this service covers manual
/// handling.
pub struct RequestService {
    pool: SqlitePool,
}

impl RequestService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lodge a request. The due date is always set before persistence,
    /// defaulting to 30 days after receipt.
    pub async fn create(&self, input: NewDataSubjectRequest) -> Result<DataSubjectRequest> {
        let now = Utc::now();
        let date_received = input.date_received.unwrap_or(now);
        let due_date = input.due_date.unwrap_or(date_received + Duration::days(30));

        info!(
            "Received {:?} request from {}",
            input.request_type, input.data_subject_email
        );

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO data_subject_requests
                (organization_id, request_type, data_subject_name, data_subject_email,
                 request_details, date_received, status, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.organization_id)
        .bind(input.request_type)
        .bind(&input.data_subject_name)
        .bind(&input.data_subject_email)
        .bind(&input.request_details)
        .bind(date_received)
        .bind(RequestStatus::New)
        .bind(due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<DataSubjectRequest> {
        sqlx::query_as::<_, DataSubjectRequest>("SELECT * FROM data_subject_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("data subject request {id}")))
    }

    pub async fn list(&self, organization_id: i64) -> Result<Vec<DataSubjectRequest>> {
        let requests = sqlx::query_as::<_, DataSubjectRequest>(
            "SELECT * FROM data_subject_requests WHERE organization_id = ? ORDER BY date_received DESC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// Move a request along its manual lifecycle. Terminal statuses never
    /// change again.
    pub async fn update_status(&self, id: i64, status: RequestStatus) -> Result<DataSubjectRequest> {
        let request = self.get(id).await?;
        if matches!(
            request.status,
            RequestStatus::Completed | RequestStatus::Denied | RequestStatus::Rejected
        ) {
            return Err(ComplianceError::InvalidTransition(format!(
                "request {id} already has terminal status"
            )));
        }
        let now = Utc::now();
        let completed_date = matches!(status, RequestStatus::Completed).then_some(now);
        sqlx::query(
            "UPDATE data_subject_requests SET status = ?, completed_date = COALESCE(?, completed_date), updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(completed_date)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get(id).await
    }
}
