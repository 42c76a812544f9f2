use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status values tallied by the report. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Pending,
    InProgress,
    NotRelevant,
    JobNotFound,
    AlreadyApplied,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Completed,
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::NotRelevant,
        TaskStatus::JobNotFound,
        TaskStatus::AlreadyApplied,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::NotRelevant => "not_relevant",
            TaskStatus::JobNotFound => "job_not_found",
            TaskStatus::AlreadyApplied => "already_applied",
        }
    }

    /// Returns `None` for anything outside the six known values.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Completed => "Completed",
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::NotRelevant => "Not Relevant",
            TaskStatus::JobNotFound => "Job Not Found",
            TaskStatus::AlreadyApplied => "Already Applied",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub completed: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub not_relevant: i64,
    pub job_not_found: i64,
    pub already_applied: i64,
}

impl StatusCounts {
    pub fn get(&self, status: TaskStatus) -> i64 {
        match status {
            TaskStatus::Completed => self.completed,
            TaskStatus::Pending => self.pending,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::NotRelevant => self.not_relevant,
            TaskStatus::JobNotFound => self.job_not_found,
            TaskStatus::AlreadyApplied => self.already_applied,
        }
    }

    pub fn bump(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::NotRelevant => &mut self.not_relevant,
            TaskStatus::JobNotFound => &mut self.job_not_found,
            TaskStatus::AlreadyApplied => &mut self.already_applied,
        };
        *slot += 1;
    }

    pub fn total(&self) -> i64 {
        TaskStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }
}

/// One aggregated row per (lead, operator) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub apw_id: Option<String>,
    pub lead_email: Option<String>,
    pub ca_name: Option<String>,
    pub ca_email: Option<String>,
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Eligible tasks whose status is none of the six known values. Not part of `counts`.
    pub unrecognized: i64,
}

/// A single task as exported for offline aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    pub apw_id: Option<String>,
    pub lead_email: Option<String>,
    pub ca_name: Option<String>,
    pub ca_email: Option<String>,
    pub status: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// `None` when the day after `day` is past chrono's last representable instant.
    pub fn for_day(day: NaiveDate) -> Option<Self> {
        let start = day.and_time(NaiveTime::MIN).and_utc();
        let end = start.checked_add_signed(Duration::days(1))?;
        Some(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn report_date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub success: bool,
    pub message: String,
    pub task_combinations_count: usize,
    pub tasks_data: Vec<StatusSummary>,
    pub email_sent: bool,
    pub email_sent_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_ignores_case() {
        assert_eq!(TaskStatus::parse("Completed"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("COMPLETED"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("in_PROGRESS"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("archived"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }

    #[test]
    fn counts_total_sums_every_status() {
        let mut counts = StatusCounts::default();
        for status in TaskStatus::ALL {
            counts.bump(status);
        }
        counts.bump(TaskStatus::Pending);
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.get(TaskStatus::Pending), 2);
    }

    #[test]
    fn day_window_is_half_open() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 23).unwrap();
        let window = ReportWindow::for_day(day).unwrap();
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
        assert!(window.contains(window.end - Duration::seconds(1)));
        assert_eq!(window.report_date(), day);
    }

    #[test]
    fn last_representable_day_has_no_window() {
        assert!(ReportWindow::for_day(NaiveDate::MAX).is_none());
        let eve = NaiveDate::MAX.pred_opt().unwrap();
        assert_eq!(ReportWindow::for_day(eve).unwrap().end.date_naive(), NaiveDate::MAX);
    }

    #[test]
    fn summary_serializes_flat_counts() {
        let summary = StatusSummary {
            apw_id: Some("APW-1".to_string()),
            lead_email: Some("lead@example.com".to_string()),
            ca_name: None,
            ca_email: None,
            counts: StatusCounts {
                completed: 3,
                pending: 1,
                ..Default::default()
            },
            unrecognized: 0,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["apw_id"], "APW-1");
        assert_eq!(value["completed"], 3);
        assert_eq!(value["pending"], 1);
        assert!(value["ca_name"].is_null());
    }
}
