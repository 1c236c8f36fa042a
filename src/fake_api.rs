//! Scripted `ReportsApi` used by the submitter, poller and worker tests.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

use crate::{
    api::{ApiError, ApiResult, reports::{QuarterUpload, ReportsApi}},
    reports::{Quarter, Report, ReportDetails, ReportStatus},
};

/// Report fixture with the given status and progress.
pub fn report_with(id: Uuid, status: ReportStatus, progress: u8) -> Report {
    Report {
        id,
        quarter: Quarter::Q1,
        year: 2025,
        quarter_key: Some("Q1_2025".into()),
        status,
        processing_progress: progress,
        total_files: 1,
        processed_files: 1,
        total_rows: 100,
        matched_tracks: 10,
        unmatched_tracks: 0,
        total_revenue: 50.0,
        total_streams: 1_000,
        created_at: Utc::now(),
        error_log: None,
        notes: None,
    }
}

/// Fake API answering from queues; an exhausted queue answers with an error.
#[derive(Default)]
pub struct FakeApi {
    pub uploads: Mutex<VecDeque<ApiResult<Uuid>>>,
    pub polls: Mutex<VecDeque<ApiResult<Report>>>,
    pub list: Mutex<Vec<Report>>,
    pub uploaded: Mutex<Vec<String>>,
    pub upload_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_uploads(results: Vec<ApiResult<Uuid>>) -> Self {
        let api = Self::default();
        *api.uploads.lock().unwrap() = results.into();
        api
    }

    pub fn with_polls(results: Vec<ApiResult<Report>>) -> Self {
        let api = Self::default();
        *api.polls.lock().unwrap() = results.into();
        api
    }

    pub fn uploads_made(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn polls_made(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

fn exhausted() -> ApiError {
    ApiError::Server {
        status: 500,
        message: "no scripted response".into(),
    }
}

#[async_trait]
impl ReportsApi for FakeApi {
    async fn list_reports(&self) -> ApiResult<Vec<Report>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.list.lock().unwrap().clone())
    }

    async fn get_report(&self, _id: Uuid) -> ApiResult<Report> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polls.lock().unwrap().pop_front().unwrap_or_else(|| Err(exhausted()))
    }

    async fn report_details(&self, _id: Uuid) -> ApiResult<ReportDetails> {
        Ok(ReportDetails::default())
    }

    async fn upload_report(&self, upload: &QuarterUpload) -> ApiResult<Uuid> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploaded.lock().unwrap().push(upload.period());
        self.uploads.lock().unwrap().pop_front().unwrap_or_else(|| Err(exhausted()))
    }

    async fn rename_report(&self, _id: Uuid, _name: &str) -> ApiResult<()> {
        Ok(())
    }

    async fn delete_report(&self, _id: Uuid) -> ApiResult<()> {
        Ok(())
    }
}
