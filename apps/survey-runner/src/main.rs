use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod cli;
mod wiring;

use cli::Cli;
use pipeline_cell::RunOptions;
use shared_config::AppConfig;

const PROCEDURE_ID: &str = "practicefusion-survey-sync";

fn init_tracing() {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loading Env Vars
    dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let today = Local::now().date_naive();
    let dates = cli.resolve_dates(config.run.target_date, today)?;

    if cli.dry_run {
        for date in &dates {
            println!("{}", date);
        }
        info!("Dry run: {} dates, nothing scraped", dates.len());
        return Ok(());
    }

    if !config.is_configured() {
        anyhow::bail!("EHR, CallHarbor and storage settings are required");
    }

    let run_id = Uuid::new_v4();
    let span = info_span!("procedure", procedure_id = PROCEDURE_ID, run_id = %run_id);

    run(&cli, &config, today, &dates).instrument(span).await
}

async fn run(cli: &Cli, config: &AppConfig, today: NaiveDate, dates: &[NaiveDate]) -> Result<()> {
    info!(first = ?dates.first(), count = dates.len(), "procedure started");

    let options = RunOptions {
        send_surveys: !cli.skip_surveys,
    };
    let pipeline = wiring::build_pipeline(config, today, options).await?;

    match pipeline.run(dates, options).await {
        Ok(summary) => {
            info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "procedure succeeded"
            );
            let errors = summary.error_count();
            if errors > 0 {
                warn!("{} pages or records failed and were skipped", errors);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "procedure failed");
            Err(e.into())
        }
    }
}
