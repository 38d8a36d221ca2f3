use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use log::info;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

use gdpr_backend::consent::ConsentService;
use gdpr_backend::requests::RequestService;
use gdpr_backend::routes;
use gdpr_backend::subjects::SubjectService;
use gdpr_backend::workflow::WorkflowService;

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "GDPR compliance API is working correctly"
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    info!("Connecting to database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to create pool");

    info!("Running database migrations");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let subjects = web::Data::new(SubjectService::new(pool.clone()));
    let consent = web::Data::new(ConsentService::new(pool.clone()));
    let requests = web::Data::new(RequestService::new(pool.clone()));
    let workflows = web::Data::new(WorkflowService::new(pool.clone()));
    let pool_data = web::Data::new(pool);

    info!("Starting server at http://127.0.0.1:8080");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(subjects.clone())
            .app_data(consent.clone())
            .app_data(requests.clone())
            .app_data(workflows.clone())
            .app_data(pool_data.clone())
            .service(
                web::scope("/api")
                    .configure(routes::subject_routes::config)
                    .configure(routes::request_routes::config)
                    .configure(routes::workflow_routes::config)
                    .configure(routes::dashboard_routes::config)
                    .route("/health", web::get().to(health_check)),
            )
    })
    .bind("127.0.0.1:8080")?
    .run()
    .await
}
