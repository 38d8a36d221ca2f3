use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use log::error;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

#[derive(Deserialize)]
pub struct DashboardQuery {
    organization_id: i64,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(dashboard));
}

async fn count(pool: &SqlitePool, sql: &str, organization_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(organization_id)
        .fetch_one(pool)
        .await
}

/// Compliance metrics overview for one organization.
async fn dashboard(pool: web::Data<SqlitePool>, query: web::Query<DashboardQuery>) -> HttpResponse {
    let org = query.organization_id;
    let now = Utc::now();

    let result: sqlx::Result<serde_json::Value> = async {
        let subjects =
            count(&pool, "SELECT COUNT(*) FROM data_subjects WHERE organization_id = ?", org)
                .await?;
        let expiring_soon = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM data_subjects
            WHERE organization_id = ? AND data_expiry_date > ? AND data_expiry_date <= ?
            "#,
        )
        .bind(org)
        .bind(now)
        .bind(now + Duration::days(30))
        .fetch_one(pool.get_ref())
        .await?;

        let requests_total = count(
            &pool,
            "SELECT COUNT(*) FROM data_subject_requests WHERE organization_id = ?",
            org,
        )
        .await?;
        let requests_new = count(
            &pool,
            "SELECT COUNT(*) FROM data_subject_requests WHERE organization_id = ? AND status = 'new'",
            org,
        )
        .await?;
        let requests_in_progress = count(
            &pool,
            "SELECT COUNT(*) FROM data_subject_requests WHERE organization_id = ? AND status = 'in_progress'",
            org,
        )
        .await?;
        let requests_completed = count(
            &pool,
            "SELECT COUNT(*) FROM data_subject_requests WHERE organization_id = ? AND status = 'completed'",
            org,
        )
        .await?;
        let requests_overdue = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM data_subject_requests
            WHERE organization_id = ? AND status IN ('new', 'in_progress') AND due_date < ?
            "#,
        )
        .bind(org)
        .bind(now)
        .fetch_one(pool.get_ref())
        .await?;

        let workflows_pending = count(
            &pool,
            "SELECT COUNT(*) FROM workflow_instances WHERE organization_id = ? AND status = 'pending'",
            org,
        )
        .await?;
        let workflows_in_progress = count(
            &pool,
            "SELECT COUNT(*) FROM workflow_instances WHERE organization_id = ? AND status = 'in_progress'",
            org,
        )
        .await?;
        let workflows_completed = count(
            &pool,
            "SELECT COUNT(*) FROM workflow_instances WHERE organization_id = ? AND status = 'completed'",
            org,
        )
        .await?;
        let active_templates = count(
            &pool,
            "SELECT COUNT(*) FROM workflow_templates WHERE organization_id = ? AND is_active = 1",
            org,
        )
        .await?;

        let marketing = count(
            &pool,
            "SELECT COUNT(*) FROM data_subjects WHERE organization_id = ? AND marketing_consent = 1",
            org,
        )
        .await?;
        let data_processing = count(
            &pool,
            "SELECT COUNT(*) FROM data_subjects WHERE organization_id = ? AND data_processing_consent = 1",
            org,
        )
        .await?;
        let cookie = count(
            &pool,
            "SELECT COUNT(*) FROM data_subjects WHERE organization_id = ? AND cookie_consent = 1",
            org,
        )
        .await?;

        Ok(json!({
            "data_subjects": { "count": subjects, "expiring_soon": expiring_soon },
            "data_subject_requests": {
                "total": requests_total,
                "new": requests_new,
                "in_progress": requests_in_progress,
                "completed": requests_completed,
                "overdue": requests_overdue,
            },
            "workflows": {
                "pending": workflows_pending,
                "in_progress": workflows_in_progress,
                "completed": workflows_completed,
                "active_templates": active_templates,
            },
            "consent": {
                "marketing_consent": marketing,
                "data_processing_consent": data_processing,
                "cookie_consent": cookie,
            },
        }))
    }
    .await;

    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => {
            error!("Failed to build dashboard: {e}");
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}
