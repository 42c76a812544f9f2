use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::error::ReportError;
use crate::job::SummarySource;
use crate::models::{ReportWindow, StatusCounts, StatusSummary};

// $1 = window start (inclusive), $2 = window end (exclusive), $3 = minimum score.
const STATUS_SUMMARY_SQL: &str = r#"
SELECT
    l."apwId"::TEXT AS apw_id,
    l.email::TEXT AS lead_email,
    op.name::TEXT AS ca_name,
    op.email::TEXT AS ca_email,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'completed') AS completed,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'pending') AS pending,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'in_progress') AS in_progress,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'not_relevant') AS not_relevant,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'job_not_found') AS job_not_found,
    COUNT(*) FILTER (WHERE LOWER(t.status) = 'already_applied') AS already_applied,
    COUNT(*) FILTER (
        WHERE t.status IS NULL
           OR LOWER(t.status) NOT IN (
               'completed', 'pending', 'in_progress',
               'not_relevant', 'job_not_found', 'already_applied'
           )
    ) AS unrecognized
FROM karmafy_task t
JOIN karmafy_scoredjob sj
    ON sj.id = t."scored_jobId"
JOIN karmafy_lead l
    ON l.id = t."leadId"
LEFT JOIN public."karmafy_opsPerson" op
    ON op.user_id = t."ops_personId"
WHERE t."createdAt" >= $1
  AND t."createdAt" < $2
  AND sj.score >= $3
GROUP BY
    l."apwId",
    l.email,
    op.name,
    op.email
ORDER BY
    op.name ASC NULLS LAST,
    l."apwId" ASC NULLS LAST,
    l.email ASC NULLS LAST,
    op.email ASC NULLS LAST
"#;

/// Aggregates task statuses straight from Postgres.
pub struct PgSummarySource {
    pool: PgPool,
}

impl PgSummarySource {
    /// Parses the connection string without opening a connection.
    pub fn connect_lazy(database_url: &str) -> Result<Self, ReportError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)
            .map_err(ReportError::Connection)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SummarySource for PgSummarySource {
    async fn fetch(
        &self,
        window: &ReportWindow,
        threshold: f64,
    ) -> Result<Vec<StatusSummary>, ReportError> {
        let mut conn = self.pool.acquire().await.map_err(ReportError::Connection)?;

        let result = sqlx::query(STATUS_SUMMARY_SQL)
            .bind(window.start)
            .bind(window.end)
            .bind(threshold)
            .fetch_all(&mut *conn)
            .await;

        // Closed rather than returned to the pool so nothing stays open while the mail goes out.
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close store connection");
        }
        let rows = result.map_err(ReportError::Query)?;

        rows.iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ReportError::Query)
    }
}

fn summary_from_row(row: &PgRow) -> Result<StatusSummary, sqlx::Error> {
    Ok(StatusSummary {
        apw_id: row.try_get("apw_id")?,
        lead_email: row.try_get("lead_email")?,
        ca_name: row.try_get("ca_name")?,
        ca_email: row.try_get("ca_email")?,
        counts: StatusCounts {
            completed: row.try_get("completed")?,
            pending: row.try_get("pending")?,
            in_progress: row.try_get("in_progress")?,
            not_relevant: row.try_get("not_relevant")?,
            job_not_found: row.try_get("job_not_found")?,
            already_applied: row.try_get("already_applied")?,
        },
        unrecognized: row.try_get("unrecognized")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    #[test]
    fn query_counts_every_known_status() {
        for status in TaskStatus::ALL {
            let filter = format!("LOWER(t.status) = '{}'", status.as_str());
            assert!(STATUS_SUMMARY_SQL.contains(&filter), "missing {filter}");
        }
    }

    #[test]
    fn query_uses_half_open_window_and_inclusive_score() {
        assert!(STATUS_SUMMARY_SQL.contains(r#"t."createdAt" >= $1"#));
        assert!(STATUS_SUMMARY_SQL.contains(r#"t."createdAt" < $2"#));
        assert!(STATUS_SUMMARY_SQL.contains("sj.score >= $3"));
        assert!(STATUS_SUMMARY_SQL.contains("LEFT JOIN"));
    }

    #[tokio::test]
    async fn lazy_pool_does_not_touch_the_network() {
        let source = PgSummarySource::connect_lazy("postgres://user:pw@127.0.0.1:1/tasks");
        assert!(source.is_ok());
    }

    #[test]
    fn malformed_url_is_a_connection_error() {
        let err = PgSummarySource::connect_lazy("not a url").err().unwrap();
        assert_eq!(err.kind(), "connection");
    }

    const FIXTURE_SQL: &str = r#"
CREATE TABLE karmafy_lead (id INT PRIMARY KEY, "apwId" TEXT, email TEXT);
CREATE TABLE karmafy_scoredjob (id INT PRIMARY KEY, score DOUBLE PRECISION NOT NULL);
CREATE TABLE "karmafy_opsPerson" (user_id INT PRIMARY KEY, name TEXT, email TEXT);
CREATE TABLE karmafy_task (
    id SERIAL PRIMARY KEY,
    status TEXT,
    "createdAt" TIMESTAMPTZ NOT NULL,
    "scored_jobId" INT NOT NULL REFERENCES karmafy_scoredjob (id),
    "leadId" INT NOT NULL REFERENCES karmafy_lead (id),
    "ops_personId" INT REFERENCES "karmafy_opsPerson" (user_id)
);

INSERT INTO karmafy_lead VALUES
    (1, 'APW-1', 'one@leads.example.com'),
    (2, 'APW-2', 'two@leads.example.com');
INSERT INTO karmafy_scoredjob VALUES (1, 90), (2, 75), (3, 74), (4, 80), (5, 99);
INSERT INTO "karmafy_opsPerson" VALUES
    (10, 'Jane Doe', 'jane@example.com'),
    (11, 'Amy Li', 'amy@example.com');

INSERT INTO karmafy_task (status, "createdAt", "scored_jobId", "leadId", "ops_personId") VALUES
    ('completed', '2025-12-23T10:00:00Z', 1, 1, 10),
    ('COMPLETED', '2025-12-23T00:00:00Z', 2, 1, 10),
    ('pending', '2025-12-23T11:00:00Z', 3, 1, 10),
    ('in_progress', '2025-12-24T00:00:00Z', 1, 1, 10),
    ('archived', '2025-12-23T12:00:00Z', 4, 1, 10),
    (NULL, '2025-12-23T13:00:00Z', 4, 1, 10),
    ('pending', '2025-12-23T09:00:00Z', 4, 1, NULL),
    ('not_relevant', '2025-12-23T23:59:59Z', 5, 2, 11);
"#;

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
    async fn aggregates_seeded_tasks_and_releases_connection(pool: PgPool) {
        sqlx::raw_sql(FIXTURE_SQL).execute(&pool).await.unwrap();

        let fresh = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy_with((*pool.connect_options()).clone());
        let source = PgSummarySource { pool: fresh };
        let day = chrono::NaiveDate::from_ymd_opt(2025, 12, 23).unwrap();
        let window = ReportWindow::for_day(day).unwrap();

        let rows = source.fetch(&window, 75.0).await.unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.ca_name.as_deref()).collect();
        assert_eq!(names, vec![Some("Amy Li"), Some("Jane Doe"), None]);

        let amy = &rows[0];
        assert_eq!(amy.apw_id.as_deref(), Some("APW-2"));
        assert_eq!(amy.counts.not_relevant, 1);
        assert_eq!(amy.counts.total(), 1);

        let jane = &rows[1];
        assert_eq!(jane.ca_email.as_deref(), Some("jane@example.com"));
        assert_eq!(jane.counts.completed, 2);
        assert_eq!(jane.counts.pending, 0);
        assert_eq!(jane.counts.in_progress, 0);
        assert_eq!(jane.unrecognized, 2);

        let unassigned = &rows[2];
        assert_eq!(unassigned.apw_id.as_deref(), Some("APW-1"));
        assert!(unassigned.ca_email.is_none());
        assert_eq!(unassigned.counts.pending, 1);

        assert_eq!(source.pool.size(), 0);
        source.close().await;
    }
}
