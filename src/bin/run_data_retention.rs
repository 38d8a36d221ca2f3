use anyhow::{bail, Context};
use chrono::Utc;
use log::{info, warn};
use sqlx::SqlitePool;

use gdpr_backend::retention::{RetentionOptions, RetentionService};

fn parse_options() -> anyhow::Result<RetentionOptions> {
    let mut options = RetentionOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => options.dry_run = true,
            "--generate-report" => options.generate_report = true,
            "--notify-expiring" => options.notify_expiring = true,
            "--days-before-expiry" => {
                let value = args
                    .next()
                    .context("--days-before-expiry requires a value")?;
                options.days_before_expiry = value
                    .parse()
                    .with_context(|| format!("invalid --days-before-expiry value '{value}'"))?;
            }
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let options = parse_options()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data.db".to_string());
    info!("Connecting to database at {}", database_url);
    let pool = SqlitePool::connect(&database_url).await?;
    sqlx::migrate!().run(&pool).await?;

    let service = RetentionService::new(pool);

    info!("Running data retention batch:");
    info!("- dry run: {}", options.dry_run);
    info!("- generate report: {}", options.generate_report);
    info!("- notify expiring: {}", options.notify_expiring);
    info!("- days before expiry: {}", options.days_before_expiry);

    let report = service.run(Utc::now(), &options).await?;

    info!(
        "Anonymized {} of {} expired subjects, revoked {} stale consents",
        report.subjects_anonymized, report.expired_subjects, report.consents_revoked
    );
    info!(
        "Completed {} and rejected {} deletion requests, created {} notification workflows",
        report.requests_completed, report.requests_rejected, report.notification_workflows_created
    );
    if report.errors > 0 {
        warn!("Batch finished with {} per-record errors", report.errors);
    }

    Ok(())
}
