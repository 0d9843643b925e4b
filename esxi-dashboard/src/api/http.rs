//! reqwest adapter for the orchestrator REST API

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{OrchestratorApi, PatchUpload};
use crate::error::ApiError;
use crate::models::{
    AddHostsResponse, Host, HostBatch, Job, JobWindow, Patch, RebootRequest, Settings,
    StageRequest,
};
use crate::session::Credentials;
use crate::upload::UploadProgress;

/// HTTP client bound to one orchestrator base URL (e.g. `http://localhost:8000/api`)
#[derive(Debug, Clone)]
pub struct HttpOrchestrator {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpOrchestrator {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, None)
    }

    /// Client with an overall per-request timeout; `None` keeps the
    /// transport defaults
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("esxi-dashboard/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: parsed,
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn authorize(request: RequestBuilder, auth: Option<&Credentials>) -> RequestBuilder {
        match auth {
            Some(credentials) => request.header(AUTHORIZATION, credentials.authorization()),
            None => request,
        }
    }

    /// Sends the request; any non-2xx status becomes `ApiError::Rejected`
    /// carrying the body's `detail` when there is one.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("orchestrator rejected request with {}: {}", status, body);
        Err(ApiError::rejected(status.as_u16(), extract_detail(&body)))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }
}

/// Pulls `detail` out of an error body (FastAPI style)
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) if detail.trim().is_empty() => None,
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl OrchestratorApi for HttpOrchestrator {
    async fn list_hosts(&self, auth: Option<&Credentials>) -> Result<Vec<Host>, ApiError> {
        let url = self.endpoint(&["hosts"])?;
        self.fetch(Self::authorize(self.client.get(url), auth)).await
    }

    async fn add_hosts(
        &self,
        auth: &Credentials,
        addresses: &[String],
        auto_precheck: bool,
    ) -> Result<AddHostsResponse, ApiError> {
        let url = self.endpoint(&["hosts", "add"])?;
        let request = self
            .client
            .post(url)
            .query(&[("auto_precheck", auto_precheck)])
            .json(&HostBatch {
                ip_addresses: addresses,
            });
        self.fetch(Self::authorize(request, Some(auth))).await
    }

    async fn remove_host(&self, auth: &Credentials, ip: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["hosts", ip])?;
        self.execute(Self::authorize(self.client.delete(url), Some(auth)))
            .await
    }

    async fn refresh_host(&self, auth: Option<&Credentials>, ip: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["refresh", ip])?;
        self.execute(Self::authorize(self.client.post(url), auth)).await
    }

    async fn list_jobs(
        &self,
        auth: Option<&Credentials>,
        window: JobWindow,
    ) -> Result<Vec<Job>, ApiError> {
        let url = self.endpoint(&["jobs"])?;
        let mut request = self.client.get(url);
        if let Some(days) = window.filter_days() {
            request = request.query(&[("filter_days", days)]);
        }
        self.fetch(Self::authorize(request, auth)).await
    }

    async fn run_precheck(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError> {
        let url = self.endpoint(&["precheck"])?;
        let request = self.client.post(url).json(&HostBatch {
            ip_addresses: hosts,
        });
        self.execute(Self::authorize(request, Some(auth))).await
    }

    async fn run_phase1(
        &self,
        auth: &Credentials,
        hosts: &[String],
        patch_file: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["patch", "phase1"])?;
        let request = self
            .client
            .post(url)
            .json(&StageRequest { hosts, patch_file });
        self.execute(Self::authorize(request, Some(auth))).await
    }

    async fn run_phase2(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError> {
        let url = self.endpoint(&["patch", "phase2"])?;
        let request = self.client.post(url).json(&RebootRequest { hosts });
        self.execute(Self::authorize(request, Some(auth))).await
    }

    async fn list_patches(&self, auth: Option<&Credentials>) -> Result<Vec<Patch>, ApiError> {
        let url = self.endpoint(&["patches"])?;
        self.fetch(Self::authorize(self.client.get(url), auth)).await
    }

    async fn upload_patch(
        &self,
        auth: &Credentials,
        upload: &PatchUpload,
        mut progress: UploadProgress,
    ) -> Result<(), ApiError> {
        let file = tokio::fs::File::open(&upload.path).await?;
        let total = file.metadata().await?.len();
        progress.advance(0, total);

        let mut loaded = 0u64;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                loaded += bytes.len() as u64;
                progress.advance(loaded, total);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(upload.filename.clone())
            .mime_str("application/zip")?;
        let form = Form::new().part("file", part);

        let url = self.endpoint(&["upload-patch"])?;
        let request = Self::authorize(self.client.post(url), Some(auth)).multipart(form);
        self.execute(request).await
    }

    async fn delete_patch(&self, auth: &Credentials, filename: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["patches", filename])?;
        self.execute(Self::authorize(self.client.delete(url), Some(auth)))
            .await
    }

    async fn save_settings(&self, auth: &Credentials, settings: &Settings) -> Result<(), ApiError> {
        let url = self.endpoint(&["settings"])?;
        let request = self.client.post(url).json(settings);
        self.execute(Self::authorize(request, Some(auth))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encoding() {
        let api = HttpOrchestrator::new("http://localhost:8000/api").unwrap();
        assert_eq!(
            api.endpoint(&["hosts", "add"]).unwrap().as_str(),
            "http://localhost:8000/api/hosts/add"
        );
        assert_eq!(
            api.endpoint(&["patches", "depot 8.0#1.zip"]).unwrap().as_str(),
            "http://localhost:8000/api/patches/depot%208.0%231.zip"
        );

        let trailing = HttpOrchestrator::new("http://localhost:8000/api/").unwrap();
        assert_eq!(
            trailing.endpoint(&["jobs"]).unwrap().as_str(),
            "http://localhost:8000/api/jobs"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpOrchestrator::new("not a url"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpOrchestrator::new("mailto:ops@example.com"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(r#"{"detail":"Invalid credentials"}"#),
            Some("Invalid credentials".to_string())
        );
        assert_eq!(extract_detail(r#"{"detail":null}"#), None);
        assert_eq!(extract_detail(r#"{"detail":""}"#), None);
        assert_eq!(extract_detail(r#"{"detail":"  "}"#), None);
        assert_eq!(extract_detail("Internal Server Error"), None);
        assert!(extract_detail(r#"{"detail":[{"loc":["body"],"msg":"field required"}]}"#)
            .unwrap()
            .contains("field required"));
    }
}
