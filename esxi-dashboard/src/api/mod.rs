//! Orchestrator API port
//!
//! `OrchestratorApi` is the seam between the view-sync layer and the remote
//! orchestrator. `HttpOrchestrator` is the production adapter; tests plug in
//! in-memory fakes.
//!
//! Read endpoints accept optional credentials, command endpoints require
//! them. The backend decides what an unauthenticated call may do.

mod http;

pub use http::HttpOrchestrator;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ApiError;
use crate::models::{AddHostsResponse, Host, Job, JobWindow, Patch, Settings};
use crate::session::Credentials;
use crate::upload::UploadProgress;

/// Depot file to stream to `POST /upload-patch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchUpload {
    pub path: PathBuf,
    pub filename: String,
}

#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// `GET /hosts`
    async fn list_hosts(&self, auth: Option<&Credentials>) -> Result<Vec<Host>, ApiError>;

    /// `POST /hosts/add?auto_precheck=..`, whole batch in one request
    async fn add_hosts(
        &self,
        auth: &Credentials,
        addresses: &[String],
        auto_precheck: bool,
    ) -> Result<AddHostsResponse, ApiError>;

    /// `DELETE /hosts/{ip}`
    async fn remove_host(&self, auth: &Credentials, ip: &str) -> Result<(), ApiError>;

    /// `POST /refresh/{ip}`
    async fn refresh_host(&self, auth: Option<&Credentials>, ip: &str) -> Result<(), ApiError>;

    /// `GET /jobs?filter_days=N`
    async fn list_jobs(
        &self,
        auth: Option<&Credentials>,
        window: JobWindow,
    ) -> Result<Vec<Job>, ApiError>;

    /// `POST /precheck`
    async fn run_precheck(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError>;

    /// `POST /patch/phase1`
    async fn run_phase1(
        &self,
        auth: &Credentials,
        hosts: &[String],
        patch_file: &str,
    ) -> Result<(), ApiError>;

    /// `POST /patch/phase2`
    async fn run_phase2(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError>;

    /// `GET /patches`
    async fn list_patches(&self, auth: Option<&Credentials>) -> Result<Vec<Patch>, ApiError>;

    /// `POST /upload-patch` as multipart field `file`, reporting progress as
    /// the body streams out
    async fn upload_patch(
        &self,
        auth: &Credentials,
        upload: &PatchUpload,
        progress: UploadProgress,
    ) -> Result<(), ApiError>;

    /// `DELETE /patches/{filename}`
    async fn delete_patch(&self, auth: &Credentials, filename: &str) -> Result<(), ApiError>;

    /// `POST /settings`
    async fn save_settings(&self, auth: &Credentials, settings: &Settings) -> Result<(), ApiError>;
}
