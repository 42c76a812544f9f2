use std::fmt::Write;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::models::{StatusSummary, TaskStatus};

pub struct ReportParams<'a> {
    pub app_name: &'a str,
    pub threshold: f64,
    pub report_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub dashboard_url: &'a str,
    pub rows: &'a [StatusSummary],
}

pub struct ReportRenderer;

impl ReportRenderer {
    pub fn subject(app_name: &str, threshold: f64, report_date: NaiveDate) -> String {
        format!(
            "{app_name} - Daily Task Status Report (Score ≥ {threshold}) - {}",
            report_date.format("%Y-%m-%d")
        )
    }

    /// Renders the HTML email. Counts are printed as given; the total column is
    /// the row's own six-count sum.
    pub fn render_html(params: &ReportParams<'_>) -> String {
        let template = include_str!("templates/task_status_report.html");

        // Rows go in last so store-sourced text is never scanned for placeholders.
        template
            .replace("{{app_name}}", &html_escape(params.app_name))
            .replace("{{threshold}}", &params.threshold.to_string())
            .replace("{{combination_count}}", &params.rows.len().to_string())
            .replace(
                "{{report_date}}",
                &params.report_date.format("%Y-%m-%d").to_string(),
            )
            .replace(
                "{{generated_at}}",
                &params.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            )
            .replace("{{year}}", &params.generated_at.year().to_string())
            .replace("{{dashboard_url}}", &html_escape(params.dashboard_url))
            .replace("{{legend}}", &render_legend())
            .replace("{{status_headers}}", &render_status_headers())
            .replace("{{rows}}", &render_rows(params.rows))
    }
}

fn accent(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "#059669",
        TaskStatus::Pending => "#f59e0b",
        TaskStatus::InProgress => "#3b82f6",
        TaskStatus::NotRelevant => "#6b7280",
        TaskStatus::JobNotFound => "#dc2626",
        TaskStatus::AlreadyApplied => "#8b5cf6",
    }
}

fn header_tint(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "#ecfdf5",
        TaskStatus::Pending => "#fffbeb",
        TaskStatus::InProgress => "#eff6ff",
        TaskStatus::NotRelevant => "#f9fafb",
        TaskStatus::JobNotFound => "#fef2f2",
        TaskStatus::AlreadyApplied => "#f5f3ff",
    }
}

fn legend_text(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "Tasks successfully completed",
        TaskStatus::Pending => "Tasks awaiting action",
        TaskStatus::InProgress => "Tasks currently being worked on",
        TaskStatus::NotRelevant => "Tasks marked as not relevant",
        TaskStatus::JobNotFound => "Tasks where job posting was not found",
        TaskStatus::AlreadyApplied => "Jobs already applied to",
    }
}

fn render_legend() -> String {
    let mut out = String::new();
    for status in TaskStatus::ALL {
        let _ = writeln!(
            out,
            "        <div class=\"legend-item\"><div class=\"legend-color\" style=\"background-color: {};\"></div><span><strong>{}:</strong> {}</span></div>",
            accent(status),
            status.label(),
            legend_text(status)
        );
    }
    out
}

fn render_status_headers() -> String {
    let mut out = String::new();
    for status in TaskStatus::ALL {
        let _ = writeln!(
            out,
            "              <th class=\"num\" style=\"background-color: {};\">{}</th>",
            header_tint(status),
            status.label()
        );
    }
    out
}

fn render_rows(rows: &[StatusSummary]) -> String {
    let mut out = String::new();
    for (idx, row) in rows.iter().enumerate() {
        let _ = writeln!(out, "            <tr>");
        let _ = writeln!(
            out,
            "              <td class=\"num\" style=\"color: #6b7280;\">{}</td>",
            idx + 1
        );
        let _ = writeln!(
            out,
            "              <td class=\"num\">{}</td>",
            display(&row.apw_id)
        );
        let _ = writeln!(
            out,
            "              <td class=\"mono\">{}</td>",
            display(&row.lead_email)
        );
        let _ = writeln!(
            out,
            "              <td style=\"font-weight: 600;\">{}</td>",
            display(&row.ca_name)
        );
        let _ = writeln!(
            out,
            "              <td class=\"mono\">{}</td>",
            display(&row.ca_email)
        );
        for status in TaskStatus::ALL {
            let _ = writeln!(
                out,
                "              <td class=\"num\" data-status=\"{}\" style=\"color: {};\">{}</td>",
                status.as_str(),
                accent(status),
                row.counts.get(status)
            );
        }
        let _ = writeln!(
            out,
            "              <td class=\"num total\" data-status=\"total\">{}</td>",
            row.counts.total()
        );
        let _ = writeln!(out, "            </tr>");
    }
    out
}

fn display(value: &Option<String>) -> String {
    match value.as_deref() {
        Some(text) if !text.is_empty() => html_escape(text),
        _ => "N/A".to_string(),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
