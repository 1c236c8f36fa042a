//! Report status polling with backoff and an overall deadline.

use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{api::reports::ReportsApi, config::PollCfg, reports::Report};

/// Wait schedule for polling one report.
#[derive(Clone, Debug, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(cfg: &PollCfg) -> Self {
        Self {
            initial: Duration::from_millis(cfg.initial_interval_ms.max(1)),
            max: Duration::from_millis(cfg.max_interval_ms.max(cfg.initial_interval_ms)),
            factor: cfg.backoff_factor.max(1.0),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    /// Wait before the next poll after `idle` polls without progress.
    pub fn delay_for(&self, idle: u32) -> Duration {
        let exp = i32::try_from(idle).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// How a polling run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The report reached `completed` or `failed`.
    Finished(Report),
    /// The deadline passed first; `last` is the latest successful answer.
    TimedOut { last: Option<Report> },
}

/// Poll until the report is terminal or the policy's deadline passes.
///
/// Each successful answer goes to `on_update`. Request errors are logged and
/// count as a tick without progress. No request is made after a terminal answer.
pub async fn poll_until_terminal<F>(
    api: &dyn ReportsApi,
    id: Uuid,
    policy: &PollPolicy,
    mut on_update: F,
) -> PollOutcome
where
    F: FnMut(&Report),
{
    let started = Instant::now();
    let mut idle: u32 = 0;
    let mut last: Option<Report> = None;
    tracing::info!("polling report {id}");

    loop {
        tokio::time::sleep(policy.delay_for(idle)).await;
        if started.elapsed() >= policy.timeout {
            tracing::warn!("polling report {id} timed out after {:?}", policy.timeout);
            return PollOutcome::TimedOut { last };
        }

        match api.get_report(id).await {
            Ok(report) => {
                let advanced = last
                    .as_ref()
                    .is_none_or(|l| report.processing_progress > l.processing_progress);
                on_update(&report);
                if report.status.is_terminal() {
                    tracing::info!(
                        "report {id} finished: {:?} at {}%",
                        report.status,
                        report.processing_progress
                    );
                    return PollOutcome::Finished(report);
                }
                idle = if advanced { 0 } else { idle.saturating_add(1) };
                last = Some(report);
            }
            Err(e) => {
                tracing::warn!("poll of report {id} failed: {e}");
                idle = idle.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::ApiError,
        fake_api::{FakeApi, report_with},
        reports::ReportStatus,
    };

    fn policy() -> PollPolicy {
        PollPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(4),
            factor: 2.0,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(10), Duration::from_secs(4));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(4));
    }

    #[test]
    fn test_policy_from_config_sanitizes() {
        let p = PollPolicy::from_config(&PollCfg {
            initial_interval_ms: 2000,
            max_interval_ms: 500,
            backoff_factor: 0.5,
            timeout_secs: 30,
        });
        assert_eq!(p.max, Duration::from_millis(2000));
        assert_eq!(p.factor, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_requests_after_terminal_status() {
        let id = Uuid::new_v4();
        let api = FakeApi::with_polls(vec![
            Ok(report_with(id, ReportStatus::Processing, 10)),
            Ok(report_with(id, ReportStatus::Processing, 50)),
            Ok(report_with(id, ReportStatus::Completed, 100)),
            Ok(report_with(id, ReportStatus::Completed, 100)),
        ]);

        let mut progress = vec![];
        let outcome =
            poll_until_terminal(&api, id, &policy(), |r| progress.push(r.processing_progress))
                .await;

        assert!(matches!(outcome, PollOutcome::Finished(ref r) if r.status == ReportStatus::Completed));
        assert_eq!(progress, vec![10, 50, 100]);
        assert_eq!(api.polls_made(), 3);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.polls_made(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_terminal() {
        let id = Uuid::new_v4();
        let mut failed = report_with(id, ReportStatus::Failed, 30);
        failed.error_log = Some("no rows".into());
        let api = FakeApi::with_polls(vec![Ok(failed)]);

        match poll_until_terminal(&api, id, &policy(), |_| {}).await {
            PollOutcome::Finished(r) => assert_eq!(r.error_log.as_deref(), Some("no rows")),
            other => panic!("expected Finished, got {other:?}"),
        }
        assert_eq!(api.polls_made(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_polling() {
        let id = Uuid::new_v4();
        let api = FakeApi::with_polls(vec![
            Err(ApiError::Server {
                status: 502,
                message: "bad gateway".into(),
            }),
            Err(ApiError::AuthRequired),
            Ok(report_with(id, ReportStatus::Completed, 100)),
        ]);

        let outcome = poll_until_terminal(&api, id, &policy(), |_| {}).await;
        assert!(matches!(outcome, PollOutcome::Finished(_)));
        assert_eq!(api.polls_made(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_report_times_out() {
        let id = Uuid::new_v4();
        let stalled: Vec<_> = (0..100)
            .map(|_| Ok(report_with(id, ReportStatus::Processing, 40)))
            .collect();
        let api = FakeApi::with_polls(stalled);
        let p = PollPolicy {
            timeout: Duration::from_secs(20),
            ..policy()
        };

        let start = Instant::now();
        let outcome = poll_until_terminal(&api, id, &p, |_| {}).await;
        match outcome {
            PollOutcome::TimedOut { last } => {
                assert_eq!(last.map(|r| r.processing_progress), Some(40));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        // Waits 1, 2, 4, 4, 4, 4 ... so far fewer requests than a 1s ticker.
        assert!(api.polls_made() < 10);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }
}
