use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod error;
mod job;
mod mail;
mod models;
mod report;
mod server;

use crate::aggregate::CsvSummarySource;
use crate::config::ReportConfig;
use crate::db::PgSummarySource;
use crate::job::SummarySource;
use crate::mail::GraphMailer;
use crate::models::ReportWindow;

#[derive(Parser)]
#[command(name = "task-status-report")]
#[command(about = "Daily task status report for scored-job tasks", long_about = None)]
struct Cli {
    /// Read variables from this file instead of `./.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Defaults to `send` for today's window
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate one day of tasks and email the report
    Send {
        /// UTC day to report on (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_report_day)]
        date: Option<NaiveDate>,
    },
    /// Serve the HTTP trigger endpoint
    Serve {
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Render the report to a file without sending it
    Preview {
        #[arg(long, value_parser = parse_report_day)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "report.html")]
        out: PathBuf,
        /// Aggregate a CSV task export instead of querying Postgres
        #[arg(long)]
        tasks_csv: Option<PathBuf>,
    },
}

/// Accepts only days whose following midnight is still representable.
fn parse_report_day(raw: &str) -> Result<NaiveDate, String> {
    let day: NaiveDate = raw
        .parse()
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))?;
    match ReportWindow::for_day(day) {
        Some(_) => Ok(day),
        None => Err(format!("{day} is out of range")),
    }
}

fn report_window(date: Option<NaiveDate>, now: DateTime<Utc>) -> anyhow::Result<ReportWindow> {
    let day = date.unwrap_or_else(|| now.date_naive());
    ReportWindow::for_day(day).with_context(|| format!("date {day} is out of range"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Loaded before the subscriber so RUST_LOG can come from the file.
    let env_file = config::load_env_file(cli.env_file.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("task_status_report=info,tower_http=info")),
        )
        .init();

    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Ok(None) => {}
        Err(err) => {
            tracing::error!(error = %err, "Task status report failed");
            return ExitCode::FAILURE;
        }
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "Task status report failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(ReportConfig::from_env().context("invalid configuration")?);

    match cli.command.unwrap_or(Commands::Send { date: None }) {
        Commands::Send { date } => {
            let now = Utc::now();
            let window = report_window(date, now)?;
            let source = PgSummarySource::connect_lazy(&config.database_url)?;
            let mailer = GraphMailer::new(config.clone())?;

            tracing::info!("Starting daily task status report");
            let result = job::run_report(&config, &source, &mailer, &window, now).await;
            source.close().await;
            let outcome = result.context("report run failed")?;

            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Serve { bind } => {
            let source = PgSummarySource::connect_lazy(&config.database_url)?;
            let mailer = GraphMailer::new(config.clone())?;
            let state = server::AppState {
                config: config.clone(),
                source: Arc::new(source),
                mailer: Arc::new(mailer),
            };
            server::serve(state, bind).await?;
        }
        Commands::Preview {
            date,
            out,
            tasks_csv,
        } => {
            let now = Utc::now();
            let window = report_window(date, now)?;
            let source: Box<dyn SummarySource> = match tasks_csv {
                Some(path) => Box::new(CsvSummarySource::new(path)),
                None => Box::new(PgSummarySource::connect_lazy(&config.database_url)?),
            };

            let (rows, html) = job::preview_report(&config, source.as_ref(), &window, now).await?;
            std::fs::write(&out, html)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Report for {} lead-CA combination(s) written to {}.",
                rows.len(),
                out.display()
            );
        }
    }

    Ok(())
}
