use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::mail::OutgoingMail;
use crate::models::{ReportOutcome, ReportWindow, StatusSummary};
use crate::report::{ReportParams, ReportRenderer};

/// Produces the aggregated (lead, operator) rows for a window.
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn fetch(
        &self,
        window: &ReportWindow,
        threshold: f64,
    ) -> Result<Vec<StatusSummary>, ReportError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ReportError>;
}

/// Aggregates, and when there is anything to report, renders and sends it.
pub async fn run_report(
    config: &ReportConfig,
    source: &dyn SummarySource,
    mailer: &dyn Mailer,
    window: &ReportWindow,
    now: DateTime<Utc>,
) -> Result<ReportOutcome, ReportError> {
    let run_id = Uuid::new_v4();
    let report_date = window.report_date();
    tracing::info!(
        %run_id,
        start = %window.start,
        end = %window.end,
        threshold = config.score_threshold,
        "Aggregating task statuses"
    );

    let rows = source.fetch(window, config.score_threshold).await?;
    warn_unrecognized(&run_id, &rows);

    if rows.is_empty() {
        tracing::info!(%run_id, %report_date, "No eligible tasks, skipping email");
        return Ok(ReportOutcome {
            success: true,
            message: format!(
                "No tasks found for {report_date} with score >= {}",
                config.score_threshold
            ),
            task_combinations_count: 0,
            tasks_data: Vec::new(),
            email_sent: false,
            email_sent_to: None,
        });
    }

    let mail = OutgoingMail {
        to: config.recipient.clone(),
        cc: config.cc.clone(),
        subject: ReportRenderer::subject(&config.app_name, config.score_threshold, report_date),
        html: render(config, &rows, window, now),
    };
    mailer.send(&mail).await?;

    tracing::info!(
        %run_id,
        recipient = %mail.to,
        cc = mail.cc.len(),
        combinations = rows.len(),
        "Daily task status report sent"
    );
    for row in rows.iter().take(5) {
        tracing::info!(
            %run_id,
            lead = row.apw_id.as_deref().unwrap_or("N/A"),
            ca = row.ca_name.as_deref().unwrap_or("N/A"),
            total = row.counts.total(),
            "Lead/CA tasks"
        );
    }
    if rows.len() > 5 {
        tracing::info!(%run_id, "... and {} more", rows.len() - 5);
    }

    Ok(ReportOutcome {
        success: true,
        message: format!(
            "Daily task status report sent for {} lead-CA combination(s)",
            rows.len()
        ),
        task_combinations_count: rows.len(),
        tasks_data: rows,
        email_sent: true,
        email_sent_to: Some(mail.to),
    })
}

/// Aggregates and renders without contacting the mail API.
pub async fn preview_report(
    config: &ReportConfig,
    source: &dyn SummarySource,
    window: &ReportWindow,
    now: DateTime<Utc>,
) -> Result<(Vec<StatusSummary>, String), ReportError> {
    let rows = source.fetch(window, config.score_threshold).await?;
    let html = render(config, &rows, window, now);
    Ok((rows, html))
}

fn render(
    config: &ReportConfig,
    rows: &[StatusSummary],
    window: &ReportWindow,
    now: DateTime<Utc>,
) -> String {
    ReportRenderer::render_html(&ReportParams {
        app_name: &config.app_name,
        threshold: config.score_threshold,
        report_date: window.report_date(),
        generated_at: now,
        dashboard_url: &config.dashboard_url,
        rows,
    })
}

fn warn_unrecognized(run_id: &Uuid, rows: &[StatusSummary]) {
    let dropped: i64 = rows.iter().map(|row| row.unrecognized).sum();
    if dropped > 0 {
        tracing::warn!(
            %run_id,
            dropped,
            "Eligible tasks with unrecognized status were left out of the status counts"
        );
    }
}
