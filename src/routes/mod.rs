pub mod dashboard_routes;
pub mod request_routes;
pub mod subject_routes;
pub mod workflow_routes;

use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::ComplianceError;

/// Map the domain error taxonomy onto HTTP status codes.
pub fn error_response(err: &ComplianceError) -> HttpResponse {
    let body = json!({ "error": err.to_string() });
    match err {
        ComplianceError::Configuration(_) => HttpResponse::BadRequest().json(body),
        ComplianceError::NotFound(_) => HttpResponse::NotFound().json(body),
        ComplianceError::InvalidTransition(_) => HttpResponse::Conflict().json(body),
        ComplianceError::Database(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Extract the caller's address and client string for the consent ledger.
pub fn client_info(req: &HttpRequest) -> (Option<String>, Option<String>) {
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .map(ToString::to_string);
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(ToString::to_string);
    (ip, user_agent)
}
