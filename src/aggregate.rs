use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ReportError;
use crate::job::SummarySource;
use crate::models::{ReportWindow, StatusSummary, TaskRecord, TaskStatus};

type GroupKey = (Option<String>, Option<String>, Option<String>, Option<String>);

/// Groups eligible tasks by (lead, operator) and counts them per status.
///
/// A task is eligible when `created_at` falls in the window and `score >= threshold`.
/// Rows come back ordered by operator name with unassigned operators last, then by
/// lead id, matching the Postgres aggregation.
pub fn tally(tasks: &[TaskRecord], window: &ReportWindow, threshold: f64) -> Vec<StatusSummary> {
    let mut groups: HashMap<GroupKey, StatusSummary> = HashMap::new();

    for task in tasks {
        if !window.contains(task.created_at) || task.score < threshold {
            continue;
        }

        let key = (
            task.apw_id.clone(),
            task.lead_email.clone(),
            task.ca_name.clone(),
            task.ca_email.clone(),
        );
        let entry = groups.entry(key).or_insert_with(|| StatusSummary {
            apw_id: task.apw_id.clone(),
            lead_email: task.lead_email.clone(),
            ca_name: task.ca_name.clone(),
            ca_email: task.ca_email.clone(),
            counts: Default::default(),
            unrecognized: 0,
        });

        match TaskStatus::parse(&task.status) {
            Some(status) => entry.counts.bump(status),
            None => entry.unrecognized += 1,
        }
    }

    let mut rows: Vec<StatusSummary> = groups.into_values().collect();
    rows.sort_by(|a, b| {
        nulls_last(&a.ca_name, &b.ca_name)
            .then_with(|| nulls_last(&a.apw_id, &b.apw_id))
            .then_with(|| nulls_last(&a.lead_email, &b.lead_email))
            .then_with(|| nulls_last(&a.ca_email, &b.ca_email))
    });
    rows
}

fn nulls_last(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn read_tasks_csv(path: &Path) -> Result<Vec<TaskRecord>, ReportError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| ReportError::Source(format!("failed to open {}: {e}", path.display())))?;

    reader
        .deserialize::<TaskRecord>()
        .enumerate()
        .map(|(idx, result)| {
            result.map_err(|e| {
                ReportError::Source(format!("{} record {}: {e}", path.display(), idx + 1))
            })
        })
        .collect()
}

/// Aggregates an offline task export instead of querying the store.
pub struct CsvSummarySource {
    path: PathBuf,
}

impl CsvSummarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SummarySource for CsvSummarySource {
    async fn fetch(
        &self,
        window: &ReportWindow,
        threshold: f64,
    ) -> Result<Vec<StatusSummary>, ReportError> {
        let tasks = read_tasks_csv(&self.path)?;
        Ok(tally(&tasks, window, threshold))
    }
}
