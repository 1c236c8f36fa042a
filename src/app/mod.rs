//! TUIのイベントループ、Workerイベントの反映、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use chrono::Datelike;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::Config,
    events::{Screen, UiState},
    input::{InputBoxState, InputCallbackId},
    reports::{Report, ReportDetails},
    shortcuts::Shortcuts,
    ui::Tui,
    upload::{FlowError, SingleDraft, UploadFlow},
    wizard,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// サーバーから取得したレポート（新しい順）。
    pub reports: Vec<Report>,
    /// 詳細画面で開いているレポートと、読み込み済みなら集計。
    pub details: Option<(Uuid, Option<ReportDetails>)>,
    /// 削除確認中のレポート。
    pub pending_delete: Option<Report>,
    /// アップロードモーダルの状態。
    pub flow: UploadFlow,
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    pub worker_rx: mpsc::Receiver<WorkerEvent>,

    // 設定画面・ウィザードの編集バッファ。
    pub app_url: String,
    pub auth_url: String,
    pub anon_key: String,
    pub email: String,

    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,
    pub wizard_state: wizard::WizardState,
    pub shortcuts: Shortcuts,
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;
    let shortcuts = Shortcuts::load_or_default("shortcut.toml")?;

    // Worker通信用のコマンド/イベントチャネルを作る。
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);
    tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone()));

    // 必須設定が欠けていればウィザードから始める。
    let initial_screen = if cfg.missing_fields().is_empty() {
        Screen::Main
    } else {
        Screen::InitialSetup
    };

    let mut app = App::new(cfg_path, cfg, shortcuts, tx_cmd, rx_ev, initial_screen.clone());

    if initial_screen == Screen::Main {
        request_refresh(&mut app).await?;
    }

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev);
        }

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }
    Ok(())
}

impl App {
    pub fn new(
        cfg_path: PathBuf,
        cfg: Config,
        shortcuts: Shortcuts,
        worker_tx: mpsc::Sender<WorkerCmd>,
        worker_rx: mpsc::Receiver<WorkerEvent>,
        screen: Screen,
    ) -> Self {
        Self {
            cfg_path,
            app_url: cfg.api.base_url.clone(),
            auth_url: cfg.auth.url.clone(),
            anon_key: cfg.auth.anon_key.clone(),
            email: cfg.account.email.clone(),
            cfg,
            ui: UiState::new(screen),
            reports: vec![],
            details: None,
            pending_delete: None,
            flow: UploadFlow::new(fresh_draft()),
            worker_tx,
            worker_rx,
            input_box: None,
            wizard_state: wizard::WizardState::new(),
            shortcuts,
        }
    }

    pub fn selected_report(&self) -> Option<&Report> {
        self.reports.get(self.ui.selected)
    }

    /// 状態遷移の結果を反映する。不正な遷移はステータスに出す。
    fn apply_flow(&mut self, res: Result<(), FlowError>) {
        if let Err(e) = res {
            tracing::warn!("upload flow: {e}");
            self.ui.status = format!("Upload: {e}");
        }
    }
}

/// 今日の日付から新しい単一アップロードの下書きを作る。
pub fn fresh_draft() -> SingleDraft {
    let today = chrono::Local::now();
    SingleDraft::for_date(today.year(), today.month())
}

/// WorkerイベントをUI状態へ反映する。
fn handle_worker_event(app: &mut App, ev: WorkerEvent) {
    match ev {
        WorkerEvent::SignedIn(email) => {
            app.ui.signed_in = true;
            app.ui.error = None;
            app.ui.status = format!("Signed in as {email}");
        }
        WorkerEvent::SignedOut => {
            app.ui.signed_in = false;
            app.ui.status = "Signed out".into();
        }
        WorkerEvent::AuthRequired => {
            app.ui.signed_in = false;
            app.ui.status = "Sign in required".into();
            // ウィザード以外では、入力中でなければパスワード入力を開く。
            if app.ui.screen != Screen::InitialSetup && app.input_box.is_none() {
                app.input_box = Some(InputBoxState::secret(
                    &format!("Password for {}:", app.cfg.account.email),
                    InputCallbackId::Password,
                ));
            }
        }
        WorkerEvent::ReportsLoaded(reports) => {
            app.reports = reports;
            app.ui.signed_in = true;
            app.ui.clamp_selection(app.reports.len());
            app.ui.status = format!("Loaded {} reports", app.reports.len());
        }
        WorkerEvent::DetailsLoaded { id, details } => {
            // 別のレポートへ移った後の応答は捨てる。
            if let Some((open_id, slot)) = &mut app.details
                && *open_id == id
            {
                *slot = Some(details);
                app.ui.status = "Details loaded".into();
            }
        }
        WorkerEvent::ArchiveUnpacked(groups) => match app.flow.archive_unpacked(groups) {
            Ok(0) => {
                app.ui.error = Some("No quarter folders (e.g. \"Q1 2025\") found in archive".into());
            }
            Ok(n) => {
                app.ui.error = None;
                app.ui.status = format!("Archive contains {n} quarters");
            }
            Err(e) => app.apply_flow(Err(e)),
        },
        WorkerEvent::UnpackFailed(msg) => {
            let res = app.flow.unpack_failed();
            app.apply_flow(res);
            app.ui.error = Some(format!("Could not unpack archive: {msg}"));
        }
        WorkerEvent::UploadAccepted(id) => {
            let res = app.flow.upload_accepted(id);
            app.apply_flow(res);
            app.ui.status = "Upload accepted, processing...".into();
        }
        WorkerEvent::UploadFailed(msg) => {
            let res = app.flow.upload_failed(msg.clone());
            app.apply_flow(res);
            app.ui.error = Some(format!("Upload failed: {msg}"));
        }
        WorkerEvent::BatchProgress(p) => {
            let res = app.flow.batch_progress(p);
            app.apply_flow(res);
            app.ui.status = format!("Uploading {}/{} quarters", p.attempted, p.total);
        }
        WorkerEvent::BatchFinished(summary) => {
            app.ui.status = summary.headline();
            if summary.failed() > 0 {
                app.ui.error = Some(summary.headline());
            }
            let res = app.flow.batch_finished(summary);
            app.apply_flow(res);
        }
        WorkerEvent::PollUpdate(report) => {
            let res = app.flow.poll_update(&report);
            app.apply_flow(res);
            if let Some(r) = app.reports.iter_mut().find(|r| r.id == report.id) {
                *r = report;
            }
        }
        WorkerEvent::PollFinished(outcome) => {
            let res = app.flow.poll_finished(outcome);
            app.apply_flow(res);
            if let UploadFlow::Terminal { outcome, .. } = &app.flow {
                app.ui.status = outcome.headline();
            }
        }
        WorkerEvent::PollRefused(id) => {
            // ワーカーが拒否したら、再開できる状態へ戻す。
            let res = app.flow.poll_refused(id);
            app.apply_flow(res);
            app.ui.error = Some("Another report is still being polled; press p to retry".into());
        }
        WorkerEvent::Log(s) => {
            app.ui.push_log(s);
        }
        WorkerEvent::Error(s) => {
            app.ui.error = Some(s);
        }
    }
}

/// 必須設定が揃っていればWorkerへリフレッシュ要求する。
pub async fn request_refresh(app: &mut App) -> Result<()> {
    let missing = app.cfg.missing_fields();
    if !missing.is_empty() {
        app.ui.status = format!("Settings required (press t): {}", missing.join(", "));
        tracing::warn!("refresh skipped: settings required");
    } else {
        tracing::info!("refresh requested");
        app.worker_tx.send(WorkerCmd::RefreshReports).await?;
        app.ui.status = "Refreshing reports...".into();
    }
    Ok(())
}
