use actix_web::{web, HttpResponse};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::routes::error_response;
use crate::workflow::WorkflowService;

#[derive(Deserialize)]
pub struct InstantiateInput {
    data_subject_id: Option<i64>,
    request_id: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct CompleteInput {
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
pub struct AutomationQuery {
    organization_id: i64,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    info!("Configuring workflow routes at /api/workflows");
    cfg.service(
        web::scope("/workflow-templates")
            .route("/{id}/instantiate", web::post().to(instantiate)),
    )
    .service(
        web::scope("/workflows")
            .route("/process-automated", web::post().to(process_automated))
            .route("/{id}", web::get().to(get_workflow))
            .route("/{id}/start", web::post().to(start_workflow))
            .route("/{id}/advance", web::post().to(advance_workflow)),
    )
    .service(
        web::scope("/workflow-steps").route("/{id}/complete", web::post().to(complete_step)),
    );
}

async fn instantiate(
    workflows: web::Data<WorkflowService>,
    path: web::Path<i64>,
    input: web::Json<InstantiateInput>,
) -> HttpResponse {
    match workflows
        .instantiate(path.into_inner(), input.data_subject_id, input.request_id)
        .await
    {
        Ok(instance) => HttpResponse::Created().json(instance),
        Err(e) => {
            error!("Failed to instantiate workflow: {e}");
            error_response(&e)
        }
    }
}

async fn get_workflow(workflows: web::Data<WorkflowService>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    let instance = match workflows.instance(id).await {
        Ok(instance) => instance,
        Err(e) => return error_response(&e),
    };
    match workflows.steps(id).await {
        Ok(steps) => HttpResponse::Ok().json(json!({
            "instance": instance,
            "progress_percentage": WorkflowService::progress_percentage(&steps),
            "steps": steps,
        })),
        Err(e) => error_response(&e),
    }
}

async fn start_workflow(
    workflows: web::Data<WorkflowService>,
    path: web::Path<i64>,
) -> HttpResponse {
    match workflows.start(path.into_inner()).await {
        Ok(instance) => HttpResponse::Ok().json(instance),
        Err(e) => {
            error!("Failed to start workflow: {e}");
            error_response(&e)
        }
    }
}

async fn advance_workflow(
    workflows: web::Data<WorkflowService>,
    path: web::Path<i64>,
) -> HttpResponse {
    match workflows.advance(path.into_inner()).await {
        Ok(Some(step)) => HttpResponse::Ok().json(json!({
            "status": "advanced",
            "current_step": step,
        })),
        Ok(None) => HttpResponse::Ok().json(json!({
            "status": "completed",
            "message": "Workflow has been completed",
        })),
        Err(e) => {
            error!("Failed to advance workflow: {e}");
            error_response(&e)
        }
    }
}

async fn complete_step(
    workflows: web::Data<WorkflowService>,
    path: web::Path<i64>,
    input: web::Json<CompleteInput>,
) -> HttpResponse {
    match workflows.complete_step(path.into_inner(), &input.notes).await {
        Ok(Some(step)) => HttpResponse::Ok().json(json!({
            "status": "step completed",
            "current_step": step,
        })),
        Ok(None) => HttpResponse::Ok().json(json!({
            "status": "step completed",
            "message": "Workflow has been completed",
        })),
        Err(e) => {
            error!("Failed to complete workflow step: {e}");
            error_response(&e)
        }
    }
}

async fn process_automated(
    workflows: web::Data<WorkflowService>,
    query: web::Query<AutomationQuery>,
) -> HttpResponse {
    match workflows.process_automated(query.organization_id).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            error!("Failed to process automated workflows: {e}");
            error_response(&e)
        }
    }
}
