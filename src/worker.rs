//! Background worker running all reports API calls.

use anyhow::Result;
use reqwest::Client;
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::{
        ApiError,
        auth::AuthClient,
        reports::{HttpReportsApi, QuarterUpload, ReportsApi},
        session_store::FileSessionStore,
    },
    archive::{self, ExtractedReportGroup, SpreadsheetFile},
    config::Config,
    poller::{PollOutcome, PollPolicy, poll_until_terminal},
    reports::{Report, ReportDetails},
    submit::{BatchProgress, BatchSummary, submit_archive, submit_single},
    upload::SingleDraft,
};

/// Where signed-in sessions are cached.
const SESSION_FILE: &str = "session.json";

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Sign in as the configured account.
    SignIn { password: String },
    /// Forget the cached session.
    SignOut,
    /// Persist and apply updated settings.
    SaveSettings(Config),
    /// Re-fetch the report list.
    RefreshReports,
    /// Fetch the aggregates of a completed report.
    LoadDetails(Uuid),
    /// Extract quarter groups from a ZIP file.
    UnpackArchive(PathBuf),
    /// Submit one quarter and poll it.
    UploadSingle(SingleDraft),
    /// Submit every reviewed quarter in order.
    UploadArchive(Vec<ExtractedReportGroup>),
    /// Poll a report that is still processing.
    ResumePolling(Uuid),
    Rename { id: Uuid, name: String },
    Delete(Uuid),
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    SignedIn(String),
    SignedOut,
    /// No usable session; the UI asks for the password.
    AuthRequired,
    /// Full list, most recent first.
    ReportsLoaded(Vec<Report>),
    DetailsLoaded { id: Uuid, details: ReportDetails },
    ArchiveUnpacked(Vec<ExtractedReportGroup>),
    UnpackFailed(String),
    UploadAccepted(Uuid),
    UploadFailed(String),
    BatchProgress(BatchProgress),
    BatchFinished(BatchSummary),
    PollUpdate(Report),
    PollFinished(PollOutcome),
    /// Polling this report was refused because another poll is running.
    PollRefused(Uuid),
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Build the shared HTTP client.
fn http_client(cfg: &Config) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(cfg.http.connect_timeout_secs))
        .build()?)
}

/// Worker state: clients built from the current config and the running tasks.
pub struct Worker {
    cfg: Config,
    auth: Arc<AuthClient>,
    api: Arc<dyn ReportsApi>,
    tx: mpsc::Sender<WorkerEvent>,
    /// Set while a poll task has not yet reported its outcome.
    polling: Arc<AtomicBool>,
    /// Set while a batch task has not yet reported its summary.
    batching: Arc<AtomicBool>,
}

impl Worker {
    /// Build the auth and reports clients for `cfg`.
    pub fn new(cfg: Config, tx: mpsc::Sender<WorkerEvent>) -> Result<Self> {
        let (auth, api) = Self::clients(&cfg)?;
        Ok(Self::with_api(cfg, tx, auth, api))
    }

    pub fn with_api(
        cfg: Config,
        tx: mpsc::Sender<WorkerEvent>,
        auth: Arc<AuthClient>,
        api: Arc<dyn ReportsApi>,
    ) -> Self {
        Self {
            cfg,
            auth,
            api,
            tx,
            polling: Arc::new(AtomicBool::new(false)),
            batching: Arc::new(AtomicBool::new(false)),
        }
    }

    fn clients(cfg: &Config) -> Result<(Arc<AuthClient>, Arc<dyn ReportsApi>)> {
        let http = http_client(cfg)?;
        let auth = Arc::new(AuthClient::new(
            http.clone(),
            &cfg.auth.url,
            &cfg.auth.anon_key,
            &cfg.account.email,
            FileSessionStore::new(SESSION_FILE),
        ));
        let api: Arc<dyn ReportsApi> =
            Arc::new(HttpReportsApi::new(http, &cfg.api.base_url, auth.clone()));
        Ok((auth, api))
    }

    async fn emit(&self, ev: WorkerEvent) {
        let _ = self.tx.send(ev).await;
    }

    /// Forward an API error; a missing session becomes `AuthRequired`.
    async fn api_error(&self, context: &str, e: ApiError) {
        tracing::error!("{context}: {e}");
        match e {
            ApiError::AuthRequired => self.emit(WorkerEvent::AuthRequired).await,
            e => self.emit(WorkerEvent::Error(format!("{context}: {e}"))).await,
        }
    }

    fn poll_running(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    fn batch_running(&self) -> bool {
        self.batching.load(Ordering::Acquire)
    }

    /// Handle one command. Long-running uploads and polls are spawned.
    pub async fn handle(&mut self, cmd: WorkerCmd) {
        match cmd {
            WorkerCmd::SignIn { password } => match self.auth.sign_in(&password).await {
                Ok(()) => {
                    self.emit(WorkerEvent::SignedIn(self.auth.email().to_string()))
                        .await;
                    send_reports(self.api.as_ref(), &self.tx).await;
                }
                Err(e) => {
                    tracing::error!("sign in failed: {e}");
                    self.emit(WorkerEvent::Error(format!("sign in failed: {e}")))
                        .await;
                }
            },

            WorkerCmd::SignOut => match self.auth.sign_out().await {
                Ok(()) => {
                    tracing::info!("signed out");
                    self.emit(WorkerEvent::SignedOut).await;
                }
                Err(e) => {
                    tracing::error!("sign out failed: {e}");
                    self.emit(WorkerEvent::Error(format!("sign out failed: {e}")))
                        .await;
                }
            },

            WorkerCmd::SaveSettings(new_cfg) => {
                tracing::info!("settings updated");
                match Self::clients(&new_cfg) {
                    Ok((auth, api)) => {
                        self.auth = auth;
                        self.api = api;
                        self.cfg = new_cfg;
                        self.emit(WorkerEvent::Log("settings updated".into())).await;
                        if !self.auth.has_session().await {
                            self.emit(WorkerEvent::AuthRequired).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("client rebuild failed: {e}");
                        self.emit(WorkerEvent::Error(format!("settings not applied: {e}")))
                            .await;
                    }
                }
            }

            WorkerCmd::RefreshReports => {
                tracing::info!("refresh reports");
                send_reports(self.api.as_ref(), &self.tx).await;
            }

            WorkerCmd::LoadDetails(id) => match self.api.report_details(id).await {
                Ok(details) => self.emit(WorkerEvent::DetailsLoaded { id, details }).await,
                Err(e) => self.api_error("details failed", e).await,
            },

            WorkerCmd::UnpackArchive(path) => {
                tracing::info!("unpack archive: {}", path.display());
                match archive::unpack_archive_file(&path).await {
                    Ok(groups) => {
                        tracing::info!("archive has {} quarter groups", groups.len());
                        self.emit(WorkerEvent::ArchiveUnpacked(groups)).await;
                    }
                    Err(e) => {
                        tracing::error!("unpack failed: {e}");
                        self.emit(WorkerEvent::UnpackFailed(e.to_string())).await;
                    }
                }
            }

            WorkerCmd::UploadSingle(draft) => self.upload_single(draft).await,

            WorkerCmd::UploadArchive(groups) => self.upload_archive(groups).await,

            WorkerCmd::ResumePolling(id) => self.start_polling(id).await,

            WorkerCmd::Rename { id, name } => {
                let name = name.trim().to_string();
                match self.api.rename_report(id, &name).await {
                    Ok(()) => {
                        tracing::info!("report {id} renamed");
                        self.emit(WorkerEvent::Log(format!("renamed report to \"{name}\"")))
                            .await;
                        send_reports(self.api.as_ref(), &self.tx).await;
                    }
                    Err(e) => self.api_error("rename failed", e).await,
                }
            }

            WorkerCmd::Delete(id) => match self.api.delete_report(id).await {
                Ok(()) => {
                    tracing::info!("report {id} deleted");
                    self.emit(WorkerEvent::Log("report deleted".into())).await;
                    send_reports(self.api.as_ref(), &self.tx).await;
                }
                Err(e) => self.api_error("delete failed", e).await,
            },
        }
    }

    async fn upload_single(&mut self, draft: SingleDraft) {
        if self.poll_running() || self.batch_running() {
            self.emit(WorkerEvent::UploadFailed(
                "another upload is still in progress".into(),
            ))
            .await;
            return;
        }

        let mut files = Vec::with_capacity(draft.files.len());
        for path in &draft.files {
            match SpreadsheetFile::read(path).await {
                Ok(f) => files.push(f),
                Err(e) => {
                    tracing::error!("cannot read {}: {e}", path.display());
                    self.emit(WorkerEvent::UploadFailed(e.to_string())).await;
                    return;
                }
            }
        }
        let upload = QuarterUpload {
            quarter: draft.quarter,
            year: draft.year,
            files,
        };

        match submit_single(self.api.as_ref(), &upload).await {
            Ok(id) => {
                self.emit(WorkerEvent::UploadAccepted(id)).await;
                self.start_polling(id).await;
            }
            Err(ApiError::AuthRequired) => {
                self.emit(WorkerEvent::UploadFailed("sign in required".into()))
                    .await;
                self.emit(WorkerEvent::AuthRequired).await;
            }
            Err(e) => self.emit(WorkerEvent::UploadFailed(e.to_string())).await,
        }
    }

    async fn upload_archive(&mut self, groups: Vec<ExtractedReportGroup>) {
        if self.poll_running() || self.batch_running() {
            tracing::warn!("archive upload refused: another upload is in progress");
            self.emit(WorkerEvent::UploadFailed(
                "another upload is still in progress".into(),
            ))
            .await;
            return;
        }

        let api = self.api.clone();
        let tx = self.tx.clone();
        let batching = self.batching.clone();
        let delay = Duration::from_millis(self.cfg.upload.inter_request_delay_ms);
        let settle = Duration::from_millis(self.cfg.upload.settle_delay_ms);
        batching.store(true, Ordering::Release);
        tokio::spawn(async move {
            let summary = submit_archive(api.as_ref(), groups, delay, |p| {
                forward_progress(&tx, WorkerEvent::BatchProgress(p));
            })
            .await;
            tokio::time::sleep(settle).await;
            // The slot is free once the UI can see the summary.
            batching.store(false, Ordering::Release);
            let _ = tx.send(WorkerEvent::BatchFinished(summary)).await;
            send_reports(api.as_ref(), &tx).await;
        });
    }

    /// Spawn the poller unless one is already running.
    async fn start_polling(&mut self, id: Uuid) {
        if self.poll_running() {
            tracing::warn!("poll for {id} refused: another report is being polled");
            self.emit(WorkerEvent::PollRefused(id)).await;
            return;
        }

        let api = self.api.clone();
        let tx = self.tx.clone();
        let polling = self.polling.clone();
        let policy = PollPolicy::from_config(&self.cfg.poll);
        polling.store(true, Ordering::Release);
        tokio::spawn(async move {
            let outcome = poll_until_terminal(api.as_ref(), id, &policy, |r| {
                forward_progress(&tx, WorkerEvent::PollUpdate(r.clone()));
            })
            .await;
            let finished = matches!(outcome, PollOutcome::Finished(_));
            // Cleared before the outcome is sent so the next poll is accepted
            // while the list below is still loading.
            polling.store(false, Ordering::Release);
            let _ = tx.send(WorkerEvent::PollFinished(outcome)).await;
            if finished {
                send_reports(api.as_ref(), &tx).await;
            }
        });
    }
}

/// Send a progress event without waiting; a full channel drops it.
fn forward_progress(tx: &mpsc::Sender<WorkerEvent>, ev: WorkerEvent) {
    if let Err(e) = tx.try_send(ev) {
        tracing::debug!("progress event dropped: {e}");
    }
}

/// Fetch the list and forward it (or the error).
async fn send_reports(api: &dyn ReportsApi, tx: &mpsc::Sender<WorkerEvent>) {
    match api.list_reports().await {
        Ok(reports) => {
            tracing::info!("loaded {} reports", reports.len());
            let _ = tx.send(WorkerEvent::ReportsLoaded(reports)).await;
        }
        Err(ApiError::AuthRequired) => {
            tracing::warn!("list failed: sign in required");
            let _ = tx.send(WorkerEvent::AuthRequired).await;
        }
        Err(e) => {
            tracing::error!("list failed: {e}");
            let _ = tx.send(WorkerEvent::Error(format!("list failed: {e}"))).await;
        }
    }
}

/// Main worker loop: build clients, then handle commands in order.
pub async fn run(mut rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>, cfg: Config) {
    let mut worker = match Worker::new(cfg, tx.clone()) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("worker init failed: {e}");
            let _ = tx
                .send(WorkerEvent::Error(format!("worker init failed: {e}")))
                .await;
            return;
        }
    };
    tracing::info!("worker started");

    while let Some(cmd) = rx.recv().await {
        worker.handle(cmd).await;
    }
    tracing::info!("worker stopped");
}
