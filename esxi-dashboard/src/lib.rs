//! ESXi Dashboard - operator client for the ESXi patch orchestrator
//!
//! Mirrors the orchestrator's hosts, jobs and patches by polling its REST
//! API, and sends operator commands (add/remove hosts, pre-checks, two-phase
//! patching, depot upload, settings) as single-shot requests.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod prompt;
pub mod refresh;
pub mod render;
pub mod session;
pub mod sync;
pub mod upload;
pub mod validation;
pub mod view;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpOrchestrator, OrchestratorApi, PatchUpload};
pub use error::{ApiError, AuthError, DashboardError, ValidationError};
pub use refresh::AutoRefresh;
pub use session::{Credentials, Session};
pub use sync::{AddHostsReport, Dashboard, Dispatch, PatchChoice};
pub use upload::{UploadEvent, UploadProgress};
pub use view::{DashboardView, ViewState};
