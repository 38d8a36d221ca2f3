use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info};
use serde::Deserialize;

use crate::consent::ConsentService;
use crate::models::{ConsentType, NewDataSubject};
use crate::routes::{client_info, error_response};
use crate::subjects::SubjectService;

#[derive(Deserialize)]
pub struct ConsentInput {
    consent_type: ConsentType,
    granted: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    organization_id: i64,
}

#[derive(Deserialize)]
pub struct RectifyInput {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    info!("Configuring subject routes at /api/subjects");
    cfg.service(
        web::scope("/subjects")
            .route("", web::post().to(create_subject))
            .route("", web::get().to(list_subjects))
            .route("/{id}", web::get().to(get_subject))
            .route("/{id}", web::patch().to(rectify_subject))
            .route("/{id}/consent", web::post().to(record_consent))
            .route("/{id}/consent-activities", web::get().to(consent_activities)),
    );
}

async fn create_subject(
    subjects: web::Data<SubjectService>,
    input: web::Json<NewDataSubject>,
) -> HttpResponse {
    match subjects.create(input.into_inner()).await {
        Ok(subject) => HttpResponse::Created().json(subject),
        Err(e) => {
            error!("Failed to create data subject: {e}");
            error_response(&e)
        }
    }
}

async fn list_subjects(
    subjects: web::Data<SubjectService>,
    query: web::Query<ListQuery>,
) -> HttpResponse {
    match subjects.list(query.organization_id).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

async fn get_subject(subjects: web::Data<SubjectService>, path: web::Path<i64>) -> HttpResponse {
    match subjects.get(path.into_inner()).await {
        Ok(subject) => HttpResponse::Ok().json(subject),
        Err(e) => error_response(&e),
    }
}

async fn rectify_subject(
    subjects: web::Data<SubjectService>,
    path: web::Path<i64>,
    input: web::Json<RectifyInput>,
) -> HttpResponse {
    let input = input.into_inner();
    match subjects
        .rectify(
            path.into_inner(),
            input.first_name,
            input.last_name,
            input.email,
            input.phone,
        )
        .await
    {
        Ok(subject) => HttpResponse::Ok().json(subject),
        Err(e) => {
            error!("Failed to rectify data subject: {e}");
            error_response(&e)
        }
    }
}

async fn record_consent(
    req: HttpRequest,
    consent: web::Data<ConsentService>,
    path: web::Path<i64>,
    input: web::Json<ConsentInput>,
) -> HttpResponse {
    let (ip, user_agent) = client_info(&req);
    match consent
        .record_consent(
            path.into_inner(),
            input.consent_type,
            input.granted,
            ip.as_deref(),
            user_agent.as_deref(),
        )
        .await
    {
        Ok(activity) => HttpResponse::Created().json(activity),
        Err(e) => {
            error!("Failed to record consent: {e}");
            error_response(&e)
        }
    }
}

async fn consent_activities(
    consent: web::Data<ConsentService>,
    path: web::Path<i64>,
) -> HttpResponse {
    match consent.activities_for_subject(path.into_inner()).await {
        Ok(activities) => HttpResponse::Ok().json(activities),
        Err(e) => error_response(&e),
    }
}
