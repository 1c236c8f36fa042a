//! Report submission: one quarter at a time, or every quarter of an archive.

use std::time::Duration;
use uuid::Uuid;

use crate::{
    api::{
        ApiResult,
        reports::{QuarterUpload, ReportsApi},
    },
    archive::ExtractedReportGroup,
    reports::Quarter,
};

impl From<ExtractedReportGroup> for QuarterUpload {
    fn from(g: ExtractedReportGroup) -> Self {
        Self {
            quarter: g.quarter,
            year: g.year,
            files: g.files,
        }
    }
}

/// Outcome of one quarter in an archive batch.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupResult {
    pub quarter: Quarter,
    pub year: i32,
    /// Report id on success, error text otherwise.
    pub outcome: Result<Uuid, String>,
}

impl GroupResult {
    pub fn period(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }
}

/// Per-quarter results of an archive batch, in submission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub results: Vec<GroupResult>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// One-line status such as `3/4 quarters uploaded, failed: Q2 2024`.
    pub fn headline(&self) -> String {
        let failed: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.outcome.is_err())
            .map(GroupResult::period)
            .collect();
        let mut s = format!(
            "{}/{} quarters uploaded",
            self.succeeded(),
            self.results.len()
        );
        if !failed.is_empty() {
            s.push_str(&format!(", failed: {}", failed.join(", ")));
        }
        s
    }
}

/// Progress after each attempted quarter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchProgress {
    pub attempted: usize,
    pub succeeded: usize,
    pub total: usize,
}

impl BatchProgress {
    /// Upload share of the overall bar (successful uploads fill up to 80%).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.succeeded as f64 / self.total as f64) * 80.0).round() as u8
    }
}

/// Submit a single quarter; the caller starts polling on success.
pub async fn submit_single(api: &dyn ReportsApi, upload: &QuarterUpload) -> ApiResult<Uuid> {
    tracing::info!(
        "submitting {} ({} files)",
        upload.period(),
        upload.files.len()
    );
    match api.upload_report(upload).await {
        Ok(id) => Ok(id),
        Err(e) => {
            tracing::error!("upload of {} failed: {e}", upload.period());
            Err(e)
        }
    }
}

/// Submit archive groups one after another, pausing `delay` between requests.
///
/// A failed quarter is recorded and skipped; every group is attempted exactly once.
pub async fn submit_archive<F>(
    api: &dyn ReportsApi,
    groups: Vec<ExtractedReportGroup>,
    delay: Duration,
    mut on_progress: F,
) -> BatchSummary
where
    F: FnMut(BatchProgress),
{
    let total = groups.len();
    let mut summary = BatchSummary::default();
    tracing::info!("archive batch start: {total} quarters");

    for (i, group) in groups.into_iter().enumerate() {
        let upload = QuarterUpload::from(group);
        let outcome = match api.upload_report(&upload).await {
            Ok(id) => Ok(id),
            Err(e) => {
                tracing::error!("upload of {} failed, continuing: {e}", upload.period());
                Err(e.to_string())
            }
        };
        summary.results.push(GroupResult {
            quarter: upload.quarter,
            year: upload.year,
            outcome,
        });

        on_progress(BatchProgress {
            attempted: i + 1,
            succeeded: summary.succeeded(),
            total,
        });

        if i + 1 < total {
            tokio::time::sleep(delay).await;
        }
    }

    tracing::info!("archive batch done: {}", summary.headline());
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::ApiError,
        archive::SpreadsheetFile,
        fake_api::FakeApi,
    };

    fn group(q: Quarter, year: i32) -> ExtractedReportGroup {
        ExtractedReportGroup {
            quarter: q,
            year,
            files: vec![SpreadsheetFile {
                name: "a.csv".into(),
                mime: "text/csv",
                bytes: b"x".to_vec(),
            }],
        }
    }

    fn server_error() -> ApiError {
        ApiError::Server {
            status: 500,
            message: "boom".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_group_does_not_abort_batch() {
        let api = FakeApi::with_uploads(vec![
            Ok(Uuid::new_v4()),
            Err(server_error()),
            Ok(Uuid::new_v4()),
        ]);
        let groups = vec![
            group(Quarter::Q1, 2024),
            group(Quarter::Q2, 2024),
            group(Quarter::Q3, 2024),
        ];

        let mut seen = vec![];
        let summary = submit_archive(&api, groups, Duration::from_millis(500), |p| seen.push(p)).await;

        assert_eq!(api.uploads_made(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.results[1].period(), "Q2 2024");
        assert!(summary.results[1].outcome.is_err());
        assert_eq!(summary.headline(), "2/3 quarters uploaded, failed: Q2 2024");
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].succeeded, 2);
        assert_eq!(seen[2].percent(), 53);
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_are_submitted_in_order_with_delay() {
        let api = FakeApi::with_uploads(vec![Ok(Uuid::new_v4()), Ok(Uuid::new_v4())]);
        let start = tokio::time::Instant::now();
        let summary = submit_archive(
            &api,
            vec![group(Quarter::Q4, 2023), group(Quarter::Q1, 2024)],
            Duration::from_millis(500),
            |_| {},
        )
        .await;

        assert_eq!(summary.failed(), 0);
        assert_eq!(*api.uploaded.lock().unwrap(), vec!["Q4 2023", "Q1 2024"]);
        // One pause between two requests, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_submit_single_propagates_error() {
        let api = FakeApi::with_uploads(vec![Err(server_error())]);
        let upload = QuarterUpload::from(group(Quarter::Q1, 2025));
        assert!(submit_single(&api, &upload).await.is_err());
        assert_eq!(api.uploads_made(), 1);
    }

    #[test]
    fn test_progress_percent() {
        let p = BatchProgress {
            attempted: 2,
            succeeded: 2,
            total: 2,
        };
        assert_eq!(p.percent(), 80);
        let empty = BatchProgress {
            attempted: 0,
            succeeded: 0,
            total: 0,
        };
        assert_eq!(empty.percent(), 0);
    }
}
