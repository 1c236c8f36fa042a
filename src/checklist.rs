//! 処理チェックリスト（5段階）の導出。

use crate::{
    format::{format_grouped, format_number},
    reports::{Report, ReportStatus},
};

/// チェックリスト各行の状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// チェックリストの1行。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessingStep {
    /// 安定ID（"upload", "parse" など）。
    pub id: &'static str,
    /// 表示ラベル。
    pub label: String,
    pub status: StepStatus,
    /// 完了時の補足（件数など）。
    pub detail: Option<String>,
}

impl ProcessingStep {
    fn new(id: &'static str, label: &str, status: StepStatus) -> Self {
        Self {
            id,
            label: label.to_string(),
            status,
            detail: None,
        }
    }
}

/// 5段階の順序とラベル。
const STEPS: [(&str, &str); 5] = [
    ("upload", "Uploading files"),
    ("parse", "Parsing report rows"),
    ("match", "Matching tracks"),
    ("save", "Saving statistics"),
    ("payout", "Crediting payouts"),
];

/// 各段階が「完了」になる進捗の閾値。
const THRESHOLDS: [u8; 5] = [0, 25, 50, 75, 100];

/// 進捗値から段階の状態を決める。
fn step_status(index: usize, progress: u8) -> StepStatus {
    // 最初の段階だけは「0より大きい」で完了扱いにする。
    let done = if index == 0 {
        progress > 0
    } else {
        progress >= THRESHOLDS[index]
    };
    if done {
        return StepStatus::Completed;
    }
    // 直前の段階が完了していれば処理中。
    let started = match index {
        0 => true,
        1 => progress > 0,
        _ => progress >= THRESHOLDS[index - 1],
    };
    if started {
        StepStatus::Processing
    } else {
        StepStatus::Pending
    }
}

/// ポーリング結果のレポートから5段階のチェックリストを作る。
pub fn checklist_for(report: &Report) -> Vec<ProcessingStep> {
    let progress = report.processing_progress.min(100);
    let mut steps: Vec<ProcessingStep> = STEPS
        .iter()
        .enumerate()
        .map(|(i, (id, label))| ProcessingStep::new(id, label, step_status(i, progress)))
        .collect();

    // 完了した段階には件数の補足を付ける（アップロードは常にファイル数）。
    steps[0].detail = Some(format!("{} files", report.total_files));
    let details = [
        None,
        Some(format!("{} rows", format_grouped(report.total_rows))),
        Some(format!("{} matched", report.matched_tracks)),
        Some(format!("{} streams", format_number(report.total_streams))),
        Some(format!("{:.2} RUB", report.total_revenue)),
    ];
    for (step, detail) in steps.iter_mut().zip(details).skip(1) {
        if step.status == StepStatus::Completed {
            step.detail = detail;
        }
    }

    // 失敗したレポートは未完了の最初の段階をエラーにする。
    if report.status == ReportStatus::Failed {
        if let Some(step) = steps.iter_mut().find(|s| s.status != StepStatus::Completed) {
            step.status = StepStatus::Error;
            step.detail = report.error_log.clone();
        }
    }
    steps
}

/// 単一アップロード開始時のチェックリスト。
pub fn initial_checklist() -> Vec<ProcessingStep> {
    STEPS
        .iter()
        .enumerate()
        .map(|(i, (id, label))| {
            let status = if i == 0 {
                StepStatus::Processing
            } else {
                StepStatus::Pending
            };
            ProcessingStep::new(id, label, status)
        })
        .collect()
}

/// サーバーがアップロードを受け付けた直後のチェックリスト。
pub fn accepted_checklist(file_count: usize) -> Vec<ProcessingStep> {
    let mut steps = initial_checklist();
    steps[0].status = StepStatus::Completed;
    steps[0].detail = Some(format!("{} files", file_count));
    steps[1].status = StepStatus::Processing;
    steps
}

/// 受付直後に表示する進捗値。
pub const ACCEPTED_PROGRESS: u8 = 10;

/// 送信失敗時：最初の段階をエラーにして止める。
pub fn submit_failed_checklist(message: &str) -> Vec<ProcessingStep> {
    let mut steps = initial_checklist();
    steps[0].status = StepStatus::Error;
    steps[0].detail = Some(message.to_string());
    steps
}

/// アーカイブ一括アップロード用の3段階チェックリスト。
pub fn archive_checklist(done: usize, total: usize, finished: bool) -> Vec<ProcessingStep> {
    let uploading = if finished || done >= total {
        StepStatus::Completed
    } else {
        StepStatus::Processing
    };
    let finishing = if finished {
        StepStatus::Completed
    } else if done >= total {
        StepStatus::Processing
    } else {
        StepStatus::Pending
    };
    vec![
        ProcessingStep::new("unpack", "Archive unpacked", StepStatus::Completed),
        ProcessingStep::new(
            "upload",
            &format!("Uploading {}/{} reports", done, total),
            uploading,
        ),
        ProcessingStep::new("complete", "Finishing", finishing),
    ]
}

/// チェックリスト行の記号。
pub fn status_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Processing => "[~]",
        StepStatus::Completed => "[x]",
        StepStatus::Error => "[!]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::Quarter;
    use chrono::Utc;
    use uuid::Uuid;

    fn report(progress: u8, status: ReportStatus) -> Report {
        Report {
            id: Uuid::new_v4(),
            quarter: Quarter::Q1,
            year: 2025,
            quarter_key: None,
            status,
            processing_progress: progress,
            total_files: 3,
            processed_files: 3,
            total_rows: 12_345,
            matched_tracks: 42,
            unmatched_tracks: 1,
            total_revenue: 1234.5,
            total_streams: 2_500,
            created_at: Utc::now(),
            error_log: Some("bad csv".into()),
            notes: None,
        }
    }

    fn statuses(progress: u8) -> Vec<StepStatus> {
        checklist_for(&report(progress, ReportStatus::Processing))
            .into_iter()
            .map(|s| s.status)
            .collect()
    }

    use StepStatus::{Completed as C, Pending as P, Processing as R};

    #[test]
    fn test_thresholds_for_sample_progress_values() {
        assert_eq!(statuses(0), vec![R, P, P, P, P]);
        assert_eq!(statuses(10), vec![C, R, P, P, P]);
        assert_eq!(statuses(25), vec![C, C, R, P, P]);
        assert_eq!(statuses(40), vec![C, C, R, P, P]);
        assert_eq!(statuses(50), vec![C, C, C, R, P]);
        assert_eq!(statuses(75), vec![C, C, C, C, R]);
        assert_eq!(statuses(90), vec![C, C, C, C, R]);
        assert_eq!(statuses(100), vec![C, C, C, C, C]);
    }

    #[test]
    fn test_details_only_on_completed_steps() {
        let steps = checklist_for(&report(50, ReportStatus::Processing));
        assert_eq!(steps[0].detail.as_deref(), Some("3 files"));
        assert_eq!(steps[1].detail.as_deref(), Some("12 345 rows"));
        assert_eq!(steps[2].detail.as_deref(), Some("42 matched"));
        assert!(steps[3].detail.is_none());

        let done = checklist_for(&report(100, ReportStatus::Completed));
        assert_eq!(done[3].detail.as_deref(), Some("2.5K streams"));
        assert_eq!(done[4].detail.as_deref(), Some("1234.50 RUB"));
    }

    #[test]
    fn test_failed_report_marks_first_unfinished_step() {
        let steps = checklist_for(&report(30, ReportStatus::Failed));
        assert_eq!(steps[1].status, C);
        assert_eq!(steps[2].status, StepStatus::Error);
        assert_eq!(steps[2].detail.as_deref(), Some("bad csv"));
        assert_eq!(steps[3].status, P);
    }

    #[test]
    fn test_submit_checklists() {
        let accepted = accepted_checklist(2);
        assert_eq!(accepted[0].status, C);
        assert_eq!(accepted[1].status, R);

        let failed = submit_failed_checklist("HTTP 500");
        assert_eq!(failed[0].status, StepStatus::Error);
        assert!(failed[1..].iter().all(|s| s.status == P));
    }

    #[test]
    fn test_archive_checklist_progression() {
        let mid = archive_checklist(1, 3, false);
        assert_eq!(mid[1].label, "Uploading 1/3 reports");
        assert_eq!(mid[1].status, R);
        assert_eq!(mid[2].status, P);

        let all_sent = archive_checklist(3, 3, false);
        assert_eq!(all_sent[1].status, C);
        assert_eq!(all_sent[2].status, R);

        let finished = archive_checklist(2, 3, true);
        assert!(finished.iter().all(|s| s.status == C));
    }
}
