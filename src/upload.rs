//! Upload modal state machine.
//!
//! The modal is always in exactly one state; each transition checks the
//! current state and refuses moves that would start a second upload.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    archive::ExtractedReportGroup,
    checklist::{
        ACCEPTED_PROGRESS, ProcessingStep, accepted_checklist, archive_checklist,
        checklist_for, initial_checklist, submit_failed_checklist,
    },
    poller::PollOutcome,
    reports::{Quarter, Report, ReportStatus},
    submit::{BatchProgress, BatchSummary},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("no files selected")]
    NoFiles,
    #[error("report {0} is not the one being polled")]
    UnexpectedReport(Uuid),
    #[error("report {0} is not processing")]
    NotProcessing(Uuid),
}

/// Files and period picked for a single-mode upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleDraft {
    pub quarter: Quarter,
    pub year: i32,
    pub files: Vec<PathBuf>,
}

impl SingleDraft {
    /// Empty draft for the quarter containing `month`.
    pub fn for_date(year: i32, month: u32) -> Self {
        Self {
            quarter: Quarter::for_month(month),
            year,
            files: vec![],
        }
    }

    pub fn period(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }

    /// Add a file once; returns false for duplicates.
    pub fn add_file(&mut self, path: PathBuf) -> bool {
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    pub fn remove_last(&mut self) -> Option<PathBuf> {
        self.files.pop()
    }
}

/// What is being submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    Single { period: String, files: usize },
    Archive { done: usize, total: usize },
}

/// How an upload ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The polled report reached `completed` or `failed`.
    Finished(Report),
    /// The single-mode request was rejected.
    SubmitFailed(String),
    /// Polling gave up before the report finished.
    TimedOut {
        report_id: Uuid,
        last: Option<Report>,
    },
    /// Every archive quarter was attempted.
    Batch(BatchSummary),
}

impl Outcome {
    /// One-line summary for the status bar.
    pub fn headline(&self) -> String {
        match self {
            Outcome::Finished(r) if r.status == ReportStatus::Completed => {
                format!("{} processed", r.display_name())
            }
            Outcome::Finished(r) => format!(
                "{} failed: {}",
                r.display_name(),
                r.error_log.as_deref().unwrap_or("unknown error")
            ),
            Outcome::SubmitFailed(msg) => format!("upload failed: {msg}"),
            Outcome::TimedOut { .. } => "still processing, polling stopped".into(),
            Outcome::Batch(summary) => summary.headline(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UploadFlow {
    /// Collecting files for a single quarter.
    Idle(SingleDraft),
    /// Archive is being extracted; the draft is restored on failure.
    Unpacking {
        archive: PathBuf,
        draft: SingleDraft,
    },
    /// Archive groups are shown for confirmation.
    ReviewingArchive {
        archive: PathBuf,
        groups: Vec<ExtractedReportGroup>,
    },
    Submitting {
        submission: Submission,
        checklist: Vec<ProcessingStep>,
        progress: u8,
    },
    Polling {
        report_id: Uuid,
        checklist: Vec<ProcessingStep>,
        progress: u8,
    },
    Terminal {
        outcome: Outcome,
        checklist: Vec<ProcessingStep>,
    },
}

impl UploadFlow {
    pub fn new(draft: SingleDraft) -> Self {
        UploadFlow::Idle(draft)
    }

    /// Short state name used in messages and the INFO panel.
    pub fn state_name(&self) -> &'static str {
        match self {
            UploadFlow::Idle(_) => "idle",
            UploadFlow::Unpacking { .. } => "unpacking",
            UploadFlow::ReviewingArchive { .. } => "reviewing archive",
            UploadFlow::Submitting { .. } => "submitting",
            UploadFlow::Polling { .. } => "polling",
            UploadFlow::Terminal { .. } => "finished",
        }
    }

    /// True while a task owned by this flow is running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadFlow::Unpacking { .. } | UploadFlow::Submitting { .. } | UploadFlow::Polling { .. }
        )
    }

    pub fn draft(&self) -> Option<&SingleDraft> {
        match self {
            UploadFlow::Idle(d) => Some(d),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut SingleDraft> {
        match self {
            UploadFlow::Idle(d) => Some(d),
            _ => None,
        }
    }

    pub fn checklist(&self) -> &[ProcessingStep] {
        match self {
            UploadFlow::Submitting { checklist, .. }
            | UploadFlow::Polling { checklist, .. }
            | UploadFlow::Terminal { checklist, .. } => checklist,
            _ => &[],
        }
    }

    /// Overall bar value (0..=100).
    pub fn progress(&self) -> u8 {
        match self {
            UploadFlow::Submitting { progress, .. } | UploadFlow::Polling { progress, .. } => {
                *progress
            }
            UploadFlow::Terminal {
                outcome: Outcome::Finished(r),
                ..
            } => r.processing_progress,
            UploadFlow::Terminal {
                outcome: Outcome::Batch(_),
                ..
            } => 100,
            UploadFlow::Terminal {
                outcome: Outcome::TimedOut { last, .. },
                ..
            } => last.as_ref().map_or(0, |r| r.processing_progress),
            _ => 0,
        }
    }

    /// Report being polled, if any.
    pub fn polling_report(&self) -> Option<Uuid> {
        match self {
            UploadFlow::Polling { report_id, .. } => Some(*report_id),
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            action,
            state: self.state_name(),
        }
    }

    /// Start extracting an archive. The current draft is kept for rollback.
    pub fn start_unpack(&mut self, archive: PathBuf, fresh: SingleDraft) -> Result<(), FlowError> {
        let draft = match &*self {
            UploadFlow::Idle(d) => d.clone(),
            UploadFlow::ReviewingArchive { .. } | UploadFlow::Terminal { .. } => fresh,
            _ => return Err(self.invalid("unpack an archive")),
        };
        *self = UploadFlow::Unpacking { archive, draft };
        Ok(())
    }

    /// Extraction finished. Returns the number of groups; with none found the
    /// flow goes back to the draft it started from.
    pub fn archive_unpacked(&mut self, groups: Vec<ExtractedReportGroup>) -> Result<usize, FlowError> {
        let UploadFlow::Unpacking { archive, draft } = self else {
            return Err(self.invalid("review an archive"));
        };
        let n = groups.len();
        *self = if n == 0 {
            UploadFlow::Idle(draft.clone())
        } else {
            UploadFlow::ReviewingArchive {
                archive: archive.clone(),
                groups,
            }
        };
        Ok(n)
    }

    /// Extraction failed; back to the pre-unpack draft.
    pub fn unpack_failed(&mut self) -> Result<(), FlowError> {
        let UploadFlow::Unpacking { draft, .. } = self else {
            return Err(self.invalid("abort unpacking"));
        };
        *self = UploadFlow::Idle(draft.clone());
        Ok(())
    }

    /// Begin a single-quarter submission; returns the draft to send.
    pub fn begin_single(&mut self) -> Result<SingleDraft, FlowError> {
        let UploadFlow::Idle(draft) = self else {
            return Err(self.invalid("start an upload"));
        };
        if draft.files.is_empty() {
            return Err(FlowError::NoFiles);
        }
        let draft = draft.clone();
        *self = UploadFlow::Submitting {
            submission: Submission::Single {
                period: draft.period(),
                files: draft.files.len(),
            },
            checklist: initial_checklist(),
            progress: 0,
        };
        Ok(draft)
    }

    /// Begin submitting every reviewed group; returns the groups to send.
    pub fn begin_archive(&mut self) -> Result<Vec<ExtractedReportGroup>, FlowError> {
        let UploadFlow::ReviewingArchive { groups, .. } = self else {
            return Err(self.invalid("upload an archive"));
        };
        let groups = std::mem::take(groups);
        let total = groups.len();
        *self = UploadFlow::Submitting {
            submission: Submission::Archive { done: 0, total },
            checklist: archive_checklist(0, total, false),
            progress: 0,
        };
        Ok(groups)
    }

    /// The single-mode request was accepted; polling starts.
    pub fn upload_accepted(&mut self, report_id: Uuid) -> Result<(), FlowError> {
        let UploadFlow::Submitting {
            submission: Submission::Single { files, .. },
            ..
        } = self
        else {
            return Err(self.invalid("accept an upload"));
        };
        *self = UploadFlow::Polling {
            report_id,
            checklist: accepted_checklist(*files),
            progress: ACCEPTED_PROGRESS,
        };
        Ok(())
    }

    /// The submission was rejected before any report was created.
    pub fn upload_failed(&mut self, message: String) -> Result<(), FlowError> {
        if !matches!(self, UploadFlow::Submitting { .. }) {
            return Err(self.invalid("fail an upload"));
        }
        *self = UploadFlow::Terminal {
            checklist: submit_failed_checklist(&message),
            outcome: Outcome::SubmitFailed(message),
        };
        Ok(())
    }

    /// One more archive quarter was attempted.
    pub fn batch_progress(&mut self, p: BatchProgress) -> Result<(), FlowError> {
        let UploadFlow::Submitting {
            submission: Submission::Archive { done, total },
            checklist,
            progress,
        } = self
        else {
            return Err(self.invalid("record batch progress"));
        };
        *done = p.attempted;
        *total = p.total;
        *checklist = archive_checklist(p.attempted, p.total, false);
        *progress = p.percent();
        Ok(())
    }

    /// Every archive quarter was attempted and the settle delay has passed.
    pub fn batch_finished(&mut self, summary: BatchSummary) -> Result<(), FlowError> {
        let UploadFlow::Submitting {
            submission: Submission::Archive { total, .. },
            ..
        } = self
        else {
            return Err(self.invalid("finish a batch"));
        };
        *self = UploadFlow::Terminal {
            checklist: archive_checklist(*total, *total, true),
            outcome: Outcome::Batch(summary),
        };
        Ok(())
    }

    /// Apply a polled report to the checklist.
    pub fn poll_update(&mut self, report: &Report) -> Result<(), FlowError> {
        let UploadFlow::Polling {
            report_id,
            checklist,
            progress,
        } = self
        else {
            return Err(self.invalid("apply a poll update"));
        };
        if *report_id != report.id {
            return Err(FlowError::UnexpectedReport(report.id));
        }
        *checklist = checklist_for(report);
        *progress = report.processing_progress;
        Ok(())
    }

    /// Polling ended, either terminally or by timeout.
    pub fn poll_finished(&mut self, outcome: PollOutcome) -> Result<(), FlowError> {
        let UploadFlow::Polling {
            report_id,
            checklist,
            ..
        } = self
        else {
            return Err(self.invalid("finish polling"));
        };
        let (outcome, checklist) = match outcome {
            PollOutcome::Finished(report) => {
                let steps = checklist_for(&report);
                (Outcome::Finished(report), steps)
            }
            PollOutcome::TimedOut { last } => (
                Outcome::TimedOut {
                    report_id: *report_id,
                    last,
                },
                std::mem::take(checklist),
            ),
        };
        *self = UploadFlow::Terminal { outcome, checklist };
        Ok(())
    }

    /// The worker would not poll `id`; the report stays resumable.
    pub fn poll_refused(&mut self, id: Uuid) -> Result<(), FlowError> {
        match self.polling_report() {
            Some(report_id) if report_id == id => {
                self.poll_finished(PollOutcome::TimedOut { last: None })
            }
            Some(_) => Err(FlowError::UnexpectedReport(id)),
            None => Err(self.invalid("refuse polling")),
        }
    }

    /// Start polling a report that is still processing (e.g. picked from the list).
    pub fn watch(&mut self, report: &Report) -> Result<(), FlowError> {
        if self.is_busy() || matches!(self, UploadFlow::ReviewingArchive { .. }) {
            return Err(self.invalid("poll another report"));
        }
        if report.status != ReportStatus::Processing {
            return Err(FlowError::NotProcessing(report.id));
        }
        *self = UploadFlow::Polling {
            report_id: report.id,
            checklist: checklist_for(report),
            progress: report.processing_progress,
        };
        Ok(())
    }

    /// Resume polling after a timeout.
    pub fn resume(&mut self) -> Result<Uuid, FlowError> {
        let UploadFlow::Terminal {
            outcome: Outcome::TimedOut { report_id, last },
            checklist,
        } = self
        else {
            return Err(self.invalid("resume polling"));
        };
        let report_id = *report_id;
        let progress = last.as_ref().map_or(0, |r| r.processing_progress);
        let checklist = std::mem::take(checklist);
        *self = UploadFlow::Polling {
            report_id,
            checklist,
            progress,
        };
        Ok(report_id)
    }

    /// Discard the draft, the reviewed groups or the finished outcome.
    pub fn reset(&mut self, fresh: SingleDraft) -> Result<(), FlowError> {
        if self.is_busy() {
            return Err(self.invalid("reset the upload"));
        }
        *self = UploadFlow::Idle(fresh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::SpreadsheetFile,
        checklist::StepStatus,
        fake_api::report_with,
        submit::GroupResult,
    };

    fn draft() -> SingleDraft {
        SingleDraft::for_date(2025, 5)
    }

    fn group(q: Quarter) -> ExtractedReportGroup {
        ExtractedReportGroup {
            quarter: q,
            year: 2024,
            files: vec![SpreadsheetFile {
                name: "a.csv".into(),
                mime: "text/csv",
                bytes: vec![],
            }],
        }
    }

    #[test]
    fn test_draft_defaults_and_files() {
        let mut d = draft();
        assert_eq!(d.period(), "Q2 2025");
        assert!(d.add_file("a.csv".into()));
        assert!(!d.add_file("a.csv".into()));
        assert_eq!(d.remove_last(), Some(PathBuf::from("a.csv")));
        assert!(d.files.is_empty());
    }

    #[test]
    fn test_single_upload_happy_path() {
        let mut flow = UploadFlow::new(draft());
        assert_eq!(flow.begin_single(), Err(FlowError::NoFiles));

        flow.draft_mut().unwrap().add_file("spotify.csv".into());
        let sent = flow.begin_single().unwrap();
        assert_eq!(sent.files.len(), 1);
        assert_eq!(flow.checklist()[0].status, StepStatus::Processing);

        let id = Uuid::new_v4();
        flow.upload_accepted(id).unwrap();
        assert_eq!(flow.polling_report(), Some(id));
        assert_eq!(flow.progress(), ACCEPTED_PROGRESS);

        flow.poll_update(&report_with(id, ReportStatus::Processing, 50))
            .unwrap();
        assert_eq!(flow.progress(), 50);

        let done = report_with(id, ReportStatus::Completed, 100);
        flow.poll_finished(PollOutcome::Finished(done)).unwrap();
        assert!(!flow.is_busy());
        assert!(
            flow.checklist()
                .iter()
                .all(|s| s.status == StepStatus::Completed)
        );
    }

    #[test]
    fn test_no_second_upload_while_polling() {
        let mut flow = UploadFlow::new(draft());
        flow.draft_mut().unwrap().add_file("a.csv".into());
        flow.begin_single().unwrap();
        flow.upload_accepted(Uuid::new_v4()).unwrap();

        assert!(matches!(
            flow.begin_single(),
            Err(FlowError::InvalidTransition { state: "polling", .. })
        ));
        assert!(flow.start_unpack("x.zip".into(), draft()).is_err());
        assert!(flow.reset(draft()).is_err());
        let other = report_with(Uuid::new_v4(), ReportStatus::Processing, 30);
        assert!(flow.watch(&other).is_err());
    }

    #[test]
    fn test_poll_update_for_other_report_is_rejected() {
        let id = Uuid::new_v4();
        let mut flow = UploadFlow::new(draft());
        flow.watch(&report_with(id, ReportStatus::Processing, 20))
            .unwrap();
        let stray = report_with(Uuid::new_v4(), ReportStatus::Processing, 90);
        assert_eq!(
            flow.poll_update(&stray),
            Err(FlowError::UnexpectedReport(stray.id))
        );
        assert_eq!(flow.progress(), 20);
    }

    #[test]
    fn test_submit_failure_marks_first_step() {
        let mut flow = UploadFlow::new(draft());
        flow.draft_mut().unwrap().add_file("a.csv".into());
        flow.begin_single().unwrap();
        flow.upload_failed("Missing required fields".into()).unwrap();

        assert_eq!(flow.checklist()[0].status, StepStatus::Error);
        match &flow {
            UploadFlow::Terminal { outcome, .. } => {
                assert_eq!(outcome.headline(), "upload failed: Missing required fields")
            }
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[test]
    fn test_unpack_failure_restores_draft() {
        let mut d = draft();
        d.add_file("kept.csv".into());
        let mut flow = UploadFlow::new(d.clone());
        flow.start_unpack("bad.zip".into(), draft()).unwrap();
        assert!(flow.is_busy());
        flow.unpack_failed().unwrap();
        assert_eq!(flow.draft(), Some(&d));
    }

    #[test]
    fn test_empty_archive_returns_to_draft() {
        let mut flow = UploadFlow::new(draft());
        flow.start_unpack("empty.zip".into(), draft()).unwrap();
        assert_eq!(flow.archive_unpacked(vec![]), Ok(0));
        assert!(matches!(flow, UploadFlow::Idle(_)));
    }

    #[test]
    fn test_archive_batch_path() {
        let mut flow = UploadFlow::new(draft());
        flow.start_unpack("all.zip".into(), draft()).unwrap();
        assert_eq!(
            flow.archive_unpacked(vec![group(Quarter::Q1), group(Quarter::Q2)]),
            Ok(2)
        );

        let groups = flow.begin_archive().unwrap();
        assert_eq!(groups.len(), 2);
        flow.batch_progress(BatchProgress {
            attempted: 1,
            succeeded: 1,
            total: 2,
        })
        .unwrap();
        assert_eq!(flow.progress(), 40);

        let summary = BatchSummary {
            results: vec![
                GroupResult {
                    quarter: Quarter::Q1,
                    year: 2024,
                    outcome: Ok(Uuid::new_v4()),
                },
                GroupResult {
                    quarter: Quarter::Q2,
                    year: 2024,
                    outcome: Err("boom".into()),
                },
            ],
        };
        flow.batch_finished(summary).unwrap();
        assert_eq!(flow.progress(), 100);
        match &flow {
            UploadFlow::Terminal { outcome, .. } => {
                assert_eq!(outcome.headline(), "1/2 quarters uploaded, failed: Q2 2024")
            }
            other => panic!("expected Terminal, got {other:?}"),
        }
        flow.reset(draft()).unwrap();
        assert!(matches!(flow, UploadFlow::Idle(_)));
    }

    #[test]
    fn test_timeout_can_be_resumed() {
        let id = Uuid::new_v4();
        let mut flow = UploadFlow::new(draft());
        flow.watch(&report_with(id, ReportStatus::Processing, 60))
            .unwrap();
        flow.poll_finished(PollOutcome::TimedOut {
            last: Some(report_with(id, ReportStatus::Processing, 60)),
        })
        .unwrap();
        assert_eq!(flow.progress(), 60);

        assert_eq!(flow.resume(), Ok(id));
        assert_eq!(flow.polling_report(), Some(id));
        assert_eq!(flow.progress(), 60);
        assert!(flow.resume().is_err());
    }

    #[test]
    fn test_refused_poll_leaves_report_resumable() {
        let id = Uuid::new_v4();
        let mut flow = UploadFlow::new(draft());
        flow.watch(&report_with(id, ReportStatus::Processing, 40))
            .unwrap();

        let other = Uuid::new_v4();
        assert_eq!(
            flow.poll_refused(other),
            Err(FlowError::UnexpectedReport(other))
        );
        assert!(flow.is_busy());

        flow.poll_refused(id).unwrap();
        assert!(!flow.is_busy());
        assert!(flow.reset(draft()).is_ok());
    }

    #[test]
    fn test_refused_archive_batch_is_not_busy() {
        let mut flow = UploadFlow::new(draft());
        flow.start_unpack("all.zip".into(), draft()).unwrap();
        flow.archive_unpacked(vec![group(Quarter::Q3)]).unwrap();
        flow.begin_archive().unwrap();

        flow.upload_failed("another upload is still in progress".into())
            .unwrap();
        assert!(!flow.is_busy());
        assert_eq!(flow.checklist()[0].status, StepStatus::Error);
    }

    #[test]
    fn test_watch_requires_processing_report() {
        let mut flow = UploadFlow::new(draft());
        let done = report_with(Uuid::new_v4(), ReportStatus::Completed, 100);
        assert_eq!(flow.watch(&done), Err(FlowError::NotProcessing(done.id)));
    }
}
