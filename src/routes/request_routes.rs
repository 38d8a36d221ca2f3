use actix_web::{web, HttpResponse};
use log::{error, info};
use serde::Deserialize;

use crate::models::{NewDataSubjectRequest, RequestStatus};
use crate::requests::RequestService;
use crate::routes::error_response;

#[derive(Deserialize)]
pub struct ListQuery {
    organization_id: i64,
}

#[derive(Deserialize)]
pub struct StatusInput {
    status: RequestStatus,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    info!("Configuring request routes at /api/requests");
    cfg.service(
        web::scope("/requests")
            .route("", web::post().to(create_request))
            .route("", web::get().to(list_requests))
            .route("/{id}", web::get().to(get_request))
            .route("/{id}/status", web::post().to(update_status)),
    );
}

async fn create_request(
    requests: web::Data<RequestService>,
    input: web::Json<NewDataSubjectRequest>,
) -> HttpResponse {
    match requests.create(input.into_inner()).await {
        Ok(request) => HttpResponse::Created().json(request),
        Err(e) => {
            error!("Failed to create data subject request: {e}");
            error_response(&e)
        }
    }
}

async fn list_requests(
    requests: web::Data<RequestService>,
    query: web::Query<ListQuery>,
) -> HttpResponse {
    match requests.list(query.organization_id).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

async fn get_request(requests: web::Data<RequestService>, path: web::Path<i64>) -> HttpResponse {
    match requests.get(path.into_inner()).await {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => error_response(&e),
    }
}

async fn update_status(
    requests: web::Data<RequestService>,
    path: web::Path<i64>,
    input: web::Json<StatusInput>,
) -> HttpResponse {
    match requests.update_status(path.into_inner(), input.status).await {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => {
            error!("Failed to update request status: {e}");
            error_response(&e)
        }
    }
}
