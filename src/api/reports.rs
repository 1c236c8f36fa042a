//! Reports API wrappers (`/api/admin/reports`).

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, ApiResult, auth::TokenSource, error_from_response};
use crate::{
    archive::SpreadsheetFile,
    reports::{Quarter, Report, ReportDetails, sort_most_recent_first},
};

/// One quarter's files as sent to the ingestion endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuarterUpload {
    pub quarter: Quarter,
    pub year: i32,
    pub files: Vec<SpreadsheetFile>,
}

impl QuarterUpload {
    /// Period label such as `Q1 2025`.
    pub fn period(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }
}

/// Operations on royalty reports. The HTTP client implements it; tests use fakes.
#[async_trait]
pub trait ReportsApi: Send + Sync {
    /// All reports, most recent first.
    async fn list_reports(&self) -> ApiResult<Vec<Report>>;
    /// A single report (used for polling).
    async fn get_report(&self, id: Uuid) -> ApiResult<Report>;
    /// Aggregates of a completed report.
    async fn report_details(&self, id: Uuid) -> ApiResult<ReportDetails>;
    /// Submit one quarter's files; returns the new report id.
    async fn upload_report(&self, upload: &QuarterUpload) -> ApiResult<Uuid>;
    /// Set the free-text label.
    async fn rename_report(&self, id: Uuid, name: &str) -> ApiResult<()>;
    /// Delete the report and its statistics/payouts.
    async fn delete_report(&self, id: Uuid) -> ApiResult<()>;
}

/// Response of the upload endpoint.
#[derive(Debug, Deserialize)]
struct UploadResp {
    report_id: Uuid,
}

/// Response of the details query.
#[derive(Debug, Deserialize)]
struct DetailsResp {
    #[serde(default)]
    details: Option<ReportDetails>,
}

/// Rename request body.
#[derive(Debug, Serialize)]
struct RenameReq<'a> {
    id: Uuid,
    name: &'a str,
}

/// HTTP client for the reports endpoints.
pub struct HttpReportsApi {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpReportsApi {
    pub fn new(http: Client, base_url: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/admin/reports", self.base_url)
    }

    fn endpoint_for(&self, id: Uuid, details: bool) -> String {
        let mut url = format!(
            "{}?id={}",
            self.endpoint(),
            urlencoding::encode(&id.to_string())
        );
        if details {
            url.push_str("&details=true");
        }
        url
    }

    /// Send the request and decode a JSON body, mapping non-2xx responses.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Send the request and only check the status.
    async fn send_empty(&self, req: reqwest::RequestBuilder) -> ApiResult<()> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ReportsApi for HttpReportsApi {
    async fn list_reports(&self) -> ApiResult<Vec<Report>> {
        let token = self.tokens.access_token().await?;
        let mut reports: Vec<Report> = self
            .send_json(self.http.get(self.endpoint()).bearer_auth(token))
            .await?;
        sort_most_recent_first(&mut reports);
        Ok(reports)
    }

    async fn get_report(&self, id: Uuid) -> ApiResult<Report> {
        let token = self.tokens.access_token().await?;
        self.send_json(self.http.get(self.endpoint_for(id, false)).bearer_auth(token))
            .await
    }

    async fn report_details(&self, id: Uuid) -> ApiResult<ReportDetails> {
        let token = self.tokens.access_token().await?;
        let resp: DetailsResp = self
            .send_json(self.http.get(self.endpoint_for(id, true)).bearer_auth(token))
            .await?;
        resp.details
            .ok_or_else(|| ApiError::Parse("report has no details (not completed?)".into()))
    }

    async fn upload_report(&self, upload: &QuarterUpload) -> ApiResult<Uuid> {
        let token = self.tokens.access_token().await?;

        let mut form = Form::new();
        for f in &upload.files {
            form = form.part(
                "files",
                Part::bytes(f.bytes.clone())
                    .file_name(f.name.clone())
                    .mime_str(f.mime)?,
            );
        }
        let form = form
            .text("quarter", upload.quarter.to_string())
            .text("year", upload.year.to_string());

        let resp: UploadResp = self
            .send_json(
                self.http
                    .post(self.endpoint())
                    .bearer_auth(token)
                    .multipart(form),
            )
            .await?;
        tracing::info!(
            "report {} accepted for {} ({} files)",
            resp.report_id,
            upload.period(),
            upload.files.len()
        );
        Ok(resp.report_id)
    }

    async fn rename_report(&self, id: Uuid, name: &str) -> ApiResult<()> {
        let token = self.tokens.access_token().await?;
        self.send_empty(
            self.http
                .patch(self.endpoint())
                .bearer_auth(token)
                .json(&RenameReq { id, name }),
        )
        .await
    }

    async fn delete_report(&self, id: Uuid) -> ApiResult<()> {
        let token = self.tokens.access_token().await?;
        self.send_empty(
            self.http
                .delete(self.endpoint_for(id, false))
                .bearer_auth(token),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::StaticToken;
    use crate::reports::ReportStatus;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpReportsApi {
        HttpReportsApi::new(
            Client::new(),
            &format!("{}/", server.uri()),
            Arc::new(StaticToken("tok".into())),
        )
    }

    fn report_json(id: Uuid, created_at: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id, "quarter": "Q2", "year": 2025, "status": status,
            "processing_progress": 100, "total_files": 1, "processed_files": 1,
            "total_rows": 10, "matched_tracks": 5, "unmatched_tracks": 0,
            "total_revenue": 99.9, "total_streams": 1000,
            "created_at": created_at, "error_log": null, "notes": null
        })
    }

    #[tokio::test]
    async fn test_list_reports_sorted_with_bearer() {
        let server = MockServer::start().await;
        let (old, new) = (Uuid::new_v4(), Uuid::new_v4());
        Mock::given(method("GET"))
            .and(path("/api/admin/reports"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                report_json(old, "2024-01-01T00:00:00Z", "completed"),
                report_json(new, "2025-01-01T00:00:00Z", "processing"),
            ])))
            .mount(&server)
            .await;

        let reports = client(&server).list_reports().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, new);
        assert_eq!(reports[0].status, ReportStatus::Processing);
    }

    #[tokio::test]
    async fn test_get_report_by_id() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/api/admin/reports"))
            .and(query_param("id", id.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(report_json(id, "2025-01-01T00:00:00Z", "completed")),
            )
            .mount(&server)
            .await;

        let r = client(&server).get_report(id).await.unwrap();
        assert_eq!(r.id, id);
        assert!(r.status.is_terminal());
    }

    #[tokio::test]
    async fn test_details_unwraps_envelope() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        let mut body = report_json(id, "2025-01-01T00:00:00Z", "completed");
        body["details"] = serde_json::json!({
            "releases": [], "platforms": [{"name": "Spotify", "streams": 10, "revenue": 1.0}],
            "countries": [], "payouts": []
        });
        Mock::given(method("GET"))
            .and(path("/api/admin/reports"))
            .and(query_param("details", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let d = client(&server).report_details(id).await.unwrap();
        assert_eq!(d.platforms[0].name, "Spotify");
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_fields() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/api/admin/reports"))
            .and(header("authorization", "Bearer tok"))
            .and(body_string_contains("name=\"quarter\""))
            .and(body_string_contains("name=\"year\""))
            .and(body_string_contains("filename=\"spotify.csv\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "report_id": id, "message": "Report processing started"
            })))
            .mount(&server)
            .await;

        let upload = QuarterUpload {
            quarter: Quarter::Q1,
            year: 2025,
            files: vec![SpreadsheetFile {
                name: "spotify.csv".into(),
                mime: "text/csv",
                bytes: b"isrc,streams\n".to_vec(),
            }],
        };
        assert_eq!(client(&server).upload_report(&upload).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_upload_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/reports"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "Missing required fields"})),
            )
            .mount(&server)
            .await;

        let upload = QuarterUpload {
            quarter: Quarter::Q1,
            year: 2025,
            files: vec![],
        };
        match client(&server).upload_report(&upload).await.unwrap_err() {
            ApiError::Server { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Missing required fields");
            }
            e => panic!("expected Server error, got {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "Unauthorized"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).list_reports().await.unwrap_err();
        assert!(matches!(err, ApiError::AuthRequired));
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("PATCH"))
            .and(path("/api/admin/reports"))
            .and(body_json(serde_json::json!({"id": id, "name": "Summer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/admin/reports"))
            .and(query_param("id", id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        api.rename_report(id, "Summer").await.unwrap();
        api.delete_report(id).await.unwrap();
    }
}
