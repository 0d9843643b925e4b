//! Dashboard view-sync
//!
//! Keeps an eventually-consistent mirror of the orchestrator's hosts, jobs
//! and patches, and turns operator intent into single-shot API commands:
//! - Local validation first, nothing is sent on a validation error
//! - Confirmation before destructive or fleet-wide commands
//! - A data refresh after every successful command
//! - No job-id tracking: the next poll reveals what the command did
//!
//! Refreshes take a generation ticket before they hit the network so that a
//! slow response can never overwrite a newer one.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::api::{OrchestratorApi, PatchUpload};
use crate::error::{ApiError, AuthError, Result, ValidationError};
use crate::models::{JobWindow, Settings};
use crate::prompt::Confirm;
use crate::session::{Credentials, Session};
use crate::upload::{UploadEvent, UploadProgress};
use crate::validation::{validate_addresses, validate_depot};
use crate::view::{DashboardView, ViewState};

/// Whether a confirmable command actually went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    Declined,
}

/// Outcome of `add_hosts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddHostsReport {
    pub added: Vec<String>,
    pub precheck_status: Option<String>,
    pub auto_precheck: bool,
}

impl AddHostsReport {
    pub fn summary(&self) -> String {
        let mut message = format!("Successfully added {} hosts", self.added.len());
        if let Some(status) = &self.precheck_status {
            message.push('\n');
            message.push_str(status);
        }
        message
    }
}

/// Patch reference for Phase 1: a depot chosen for upload wins over a
/// catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchChoice {
    pub upload: Option<PathBuf>,
    pub catalog: Option<String>,
}

impl PatchChoice {
    pub fn catalog(filename: impl Into<String>) -> Self {
        Self {
            upload: None,
            catalog: Some(filename.into()),
        }
    }

    pub fn upload(path: impl Into<PathBuf>) -> Self {
        Self {
            upload: Some(path.into()),
            catalog: None,
        }
    }

    pub fn resolve(&self) -> Option<String> {
        self.upload
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
            .or_else(|| self.catalog.clone().filter(|name| !name.is_empty()))
    }
}

pub struct Dashboard<A> {
    api: A,
    confirm: Box<dyn Confirm>,
    state: Mutex<ViewState>,
    job_window: Mutex<JobWindow>,
    tickets: AtomicU64,
}

impl<A: OrchestratorApi> Dashboard<A> {
    pub fn new(api: A, confirm: impl Confirm + 'static) -> Self {
        Self {
            api,
            confirm: Box::new(confirm),
            state: Mutex::new(ViewState::default()),
            job_window: Mutex::new(JobWindow::All),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn with_job_window(self, window: JobWindow) -> Self {
        *self.job_window.lock() = window;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Current view-model
    pub fn view(&self) -> DashboardView {
        self.state.lock().view()
    }

    /// Copy of the mirrored state
    pub fn snapshot(&self) -> ViewState {
        self.state.lock().clone()
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- session ---------------------------------------------------------

    /// Probes `GET /hosts` with the credentials. Any failure, rejection or
    /// transport, is reported as invalid credentials.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<Session, AuthError> {
        let credentials = Credentials::new(username, password);

        if let Err(e) = self.api.list_hosts(Some(&credentials)).await {
            warn!("authentication for '{}' failed: {}", username, e);
            self.state.lock().revoke_admin();
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session::new(credentials);
        self.state.lock().grant_admin(session.username());
        info!("logged in as {}", session.username());

        if let Err(e) = self.refresh_all(Some(&session)).await {
            warn!("initial refresh failed: {}", e);
        }
        if let Err(e) = self.load_patches(Some(&session)).await {
            warn!("initial patch list failed: {}", e);
        }

        Ok(session)
    }

    /// Tears the session down and hides the admin controls
    pub fn logout(&self, session: Session) {
        info!("logged out {}", session.username());
        drop(session);
        self.state.lock().revoke_admin();
    }

    // ---- polling ---------------------------------------------------------

    /// Fetches hosts and jobs and applies them to the view. Both fetches are
    /// attempted; the first failure is returned.
    pub async fn refresh_all(&self, session: Option<&Session>) -> std::result::Result<(), ApiError> {
        let ticket = self.next_ticket();
        let credentials = session.map(Session::credentials);

        let hosts = self.fetch_hosts(ticket, credentials).await;
        let jobs = self.fetch_jobs(ticket, credentials).await;
        hosts.and(jobs)
    }

    /// Reloads only the host list
    pub async fn load_hosts(&self, session: Option<&Session>) -> std::result::Result<(), ApiError> {
        let ticket = self.next_ticket();
        self.fetch_hosts(ticket, session.map(Session::credentials))
            .await
    }

    /// Changes the job history window and reloads jobs
    pub async fn filter_jobs(
        &self,
        session: Option<&Session>,
        window: JobWindow,
    ) -> std::result::Result<(), ApiError> {
        *self.job_window.lock() = window;
        let ticket = self.next_ticket();
        self.fetch_jobs(ticket, session.map(Session::credentials))
            .await
    }

    pub async fn load_patches(&self, session: Option<&Session>) -> std::result::Result<(), ApiError> {
        let ticket = self.next_ticket();
        let patches = self
            .api
            .list_patches(session.map(Session::credentials))
            .await?;
        if !self.state.lock().apply_patches(ticket, patches) {
            debug!("dropped stale patch list (ticket {})", ticket);
        }
        Ok(())
    }

    async fn fetch_hosts(
        &self,
        ticket: u64,
        credentials: Option<&Credentials>,
    ) -> std::result::Result<(), ApiError> {
        let hosts = self.api.list_hosts(credentials).await?;
        if !self.state.lock().apply_hosts(ticket, hosts) {
            debug!("dropped stale host list (ticket {})", ticket);
        }
        Ok(())
    }

    async fn fetch_jobs(
        &self,
        ticket: u64,
        credentials: Option<&Credentials>,
    ) -> std::result::Result<(), ApiError> {
        let window = *self.job_window.lock();
        let jobs = self.api.list_jobs(credentials, window).await?;
        if !self.state.lock().apply_jobs(ticket, jobs) {
            debug!("dropped stale job list (ticket {})", ticket);
        }
        Ok(())
    }

    /// Post-command refresh; a failure here only leaves the view stale
    async fn settle(&self, session: Option<&Session>) {
        if let Err(e) = self.refresh_all(session).await {
            warn!("refresh after command failed: {}", e);
        }
    }

    // ---- selection -------------------------------------------------------

    pub fn select(&self, ip: &str) -> std::result::Result<(), ValidationError> {
        self.state.lock().select(ip)
    }

    pub fn select_all(&self) {
        self.state.lock().select_all();
    }

    pub fn clear_selection(&self) {
        self.state.lock().clear_selection();
    }

    pub fn selection(&self) -> BTreeSet<String> {
        self.state.lock().selection().clone()
    }

    fn ensure_known(&self, ip: &str) -> std::result::Result<(), ValidationError> {
        if self.state.lock().knows_host(ip) {
            Ok(())
        } else {
            Err(ValidationError::UnknownHost(ip.to_string()))
        }
    }

    // ---- commands --------------------------------------------------------

    /// Registers a batch of hosts. The batch goes out whole or not at all.
    pub async fn add_hosts(
        &self,
        session: &Session,
        addresses: &[String],
        auto_precheck: bool,
    ) -> Result<AddHostsReport> {
        validate_addresses(addresses)?;

        let response = self
            .api
            .add_hosts(session.credentials(), addresses, auto_precheck)
            .await?;
        info!(
            "added {} hosts (auto_precheck={})",
            response.hosts.len(),
            auto_precheck
        );

        if let Err(e) = self.load_hosts(Some(session)).await {
            warn!("host list refresh after add failed: {}", e);
        }

        Ok(AddHostsReport {
            added: response.hosts,
            precheck_status: response.precheck_status,
            auto_precheck,
        })
    }

    pub async fn run_prechecks(
        &self,
        session: &Session,
        selected: &BTreeSet<String>,
    ) -> Result<Dispatch> {
        let targets = self.state.lock().resolve_targets(selected)?;
        if !self
            .confirm
            .confirm(&format!("Run pre-checks on {} hosts?", targets.len()))
        {
            return Ok(Dispatch::Declined);
        }

        self.api
            .run_precheck(session.credentials(), &targets)
            .await?;
        info!("pre-checks initiated on {:?}", targets);

        self.settle(Some(session)).await;
        Ok(Dispatch::Sent)
    }

    /// Stages `patch` on the selected hosts. The patch reference is checked
    /// before the selection.
    pub async fn run_phase1(
        &self,
        session: &Session,
        selected: &BTreeSet<String>,
        patch: &PatchChoice,
    ) -> Result<Dispatch> {
        let patch_file = patch.resolve().ok_or(ValidationError::NoPatchSelected)?;
        let targets = self.state.lock().resolve_targets(selected)?;
        if !self
            .confirm
            .confirm(&format!("Execute Phase 1 on {} hosts?", targets.len()))
        {
            return Ok(Dispatch::Declined);
        }

        self.api
            .run_phase1(session.credentials(), &targets, &patch_file)
            .await?;
        info!("phase 1 initiated with {} on {:?}", patch_file, targets);

        self.settle(Some(session)).await;
        Ok(Dispatch::Sent)
    }

    /// Reboots the selected hosts into the staged build
    pub async fn run_phase2(
        &self,
        session: &Session,
        selected: &BTreeSet<String>,
    ) -> Result<Dispatch> {
        let targets = self.state.lock().resolve_targets(selected)?;
        if !self.confirm.confirm(&format!(
            "Execute Phase 2 (reboot) on {} hosts?",
            targets.len()
        )) {
            return Ok(Dispatch::Declined);
        }

        self.api
            .run_phase2(session.credentials(), &targets)
            .await?;
        info!("phase 2 initiated on {:?}", targets);

        self.settle(Some(session)).await;
        Ok(Dispatch::Sent)
    }

    /// Streams a depot file to the orchestrator. `progress` receives
    /// `Started`, percentages and exactly one terminal event.
    pub async fn upload_patch(
        &self,
        session: &Session,
        path: &Path,
        progress: UploadProgress,
    ) -> Result<()> {
        let filename = validate_depot(path)?;
        let total_bytes = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.len())
            .map_err(ApiError::from)?;

        progress.emit(UploadEvent::Started {
            filename: filename.clone(),
            total_bytes,
        });

        let upload = PatchUpload {
            path: path.to_path_buf(),
            filename: filename.clone(),
        };
        match self
            .api
            .upload_patch(session.credentials(), &upload, progress.clone())
            .await
        {
            Ok(()) => {
                info!("uploaded {} ({} bytes)", filename, total_bytes);
                progress.emit(UploadEvent::Completed { filename });
                if let Err(e) = self.load_patches(Some(session)).await {
                    warn!("patch list refresh after upload failed: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                progress.emit(UploadEvent::Failed {
                    filename,
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    pub async fn delete_patch(&self, session: &Session, filename: &str) -> Result<Dispatch> {
        if !self
            .confirm
            .confirm(&format!("Are you sure you want to delete {}?", filename))
        {
            return Ok(Dispatch::Declined);
        }

        self.api
            .delete_patch(session.credentials(), filename)
            .await?;
        info!("deleted patch {}", filename);

        if let Err(e) = self.load_patches(Some(session)).await {
            warn!("patch list refresh after delete failed: {}", e);
        }
        Ok(Dispatch::Sent)
    }

    pub async fn remove_host(&self, session: &Session, ip: &str) -> Result<Dispatch> {
        self.ensure_known(ip)?;
        if !self.confirm.confirm(&format!("Remove host {}?", ip)) {
            return Ok(Dispatch::Declined);
        }

        self.api.remove_host(session.credentials(), ip).await?;
        info!("removed host {}", ip);

        self.settle(Some(session)).await;
        Ok(Dispatch::Sent)
    }

    /// Asks the orchestrator to re-probe one host
    pub async fn refresh_host(&self, session: Option<&Session>, ip: &str) -> Result<()> {
        self.ensure_known(ip)?;
        self.api
            .refresh_host(session.map(Session::credentials), ip)
            .await?;
        debug!("refresh requested for {}", ip);

        self.settle(session).await;
        Ok(())
    }

    /// Re-probes every host, one after the other. Individual failures are
    /// logged and skipped. Returns the number of hosts refreshed.
    pub async fn refresh_every_host(&self, session: Option<&Session>) -> Result<Option<usize>> {
        if !self
            .confirm
            .confirm("Refresh all hosts? This may take a while.")
        {
            return Ok(None);
        }

        let credentials = session.map(Session::credentials);
        let ticket = self.next_ticket();
        let hosts = self.api.list_hosts(credentials).await?;
        self.state.lock().apply_hosts(ticket, hosts.clone());

        let mut refreshed = 0;
        for host in &hosts {
            match self.api.refresh_host(credentials, &host.ip_address).await {
                Ok(()) => refreshed += 1,
                Err(e) => warn!("failed to refresh host {}: {}", host.ip_address, e),
            }
        }
        info!("refreshed {}/{} hosts", refreshed, hosts.len());

        self.settle(session).await;
        Ok(Some(refreshed))
    }

    /// Opaque passthrough, no local validation
    pub async fn save_settings(&self, session: &Session, settings: &Settings) -> Result<()> {
        self.api
            .save_settings(session.credentials(), settings)
            .await?;
        info!("saved {} settings", settings.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use crate::models::{Job, Patch};
    use crate::prompt::FixedAnswer;
    use crate::testing::{Call, FakeApi, PASSWORD, USERNAME};
    use std::sync::Arc;
    use std::time::Duration;

    fn dashboard(api: FakeApi, confirm: bool) -> Dashboard<FakeApi> {
        Dashboard::new(api, FixedAnswer(confirm))
    }

    async fn logged_in(api: FakeApi, confirm: bool) -> (Dashboard<FakeApi>, Session) {
        let dashboard = dashboard(api, confirm);
        let session = dashboard.authenticate(USERNAME, PASSWORD).await.unwrap();
        dashboard.api().clear_calls();
        (dashboard, session)
    }

    fn set(ips: &[&str]) -> BTreeSet<String> {
        ips.iter().map(|ip| ip.to_string()).collect()
    }

    #[tokio::test]
    async fn test_authenticate_grants_admin_and_refreshes() {
        let dashboard = dashboard(FakeApi::new().with_hosts(&["10.0.0.1"]), true);
        assert!(!dashboard.view().affordances.add_hosts);

        let session = dashboard.authenticate(USERNAME, PASSWORD).await.unwrap();
        assert!(session.is_admin());
        let view = dashboard.view();
        assert!(view.affordances.add_hosts);
        assert_eq!(view.user.as_deref(), Some(USERNAME));
        assert_eq!(view.hosts.len(), 1);

        let calls = dashboard.api().calls();
        assert_eq!(calls[0], Call::ListHosts { authorized: true });
        assert!(calls.contains(&Call::ListJobs(JobWindow::All)));
        assert!(calls.contains(&Call::ListPatches));

        dashboard.logout(session);
        let view = dashboard.view();
        assert!(!view.affordances.add_hosts);
        assert!(view.affordances.login);
        assert_eq!(view.user, None);
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let dashboard = dashboard(FakeApi::new(), true);
        let result = dashboard.authenticate(USERNAME, "wrong").await;
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
        assert!(!dashboard.view().affordances.logout);
        // no follow-up refresh after a failed probe
        assert_eq!(dashboard.api().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_loads_running_jobs_and_patches() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": 7,
            "host_ip": "10.0.0.1",
            "job_type": "phase1",
            "status": "running",
            "started_at": "2024-05-01T10:00:00.123456",
        }))
        .unwrap();
        let api = FakeApi::new()
            .with_hosts(&["10.0.0.1"])
            .with_jobs(vec![job])
            .with_patches(vec![Patch {
                filename: "VMware-ESXi-8.0U2-depot.zip".into(),
                size: 612.5,
                uploaded: 1_700_000_000.0,
            }]);
        let (dashboard, _session) = logged_in(api, true).await;

        let view = dashboard.view();
        assert_eq!(view.running.len(), 1);
        assert_eq!(view.running[0].title, "phase1 - 10.0.0.1");
        assert_eq!(view.patches[0].filename, "VMware-ESXi-8.0U2-depot.zip");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_view() {
        let (dashboard, session) =
            logged_in(FakeApi::new().with_hosts(&["10.0.0.1", "10.0.0.2"]), true).await;
        let before = dashboard.view().hosts;

        dashboard.api().fail_next(503, "Service Unavailable");
        let err = dashboard.refresh_all(Some(&session)).await.unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable (HTTP 503)");
        assert_eq!(dashboard.view().hosts, before);
        // jobs are still fetched after the host list failed
        assert!(dashboard
            .api()
            .calls()
            .contains(&Call::ListJobs(JobWindow::All)));
    }

    #[tokio::test]
    async fn test_add_hosts_sends_whole_batch_then_reloads() {
        let (dashboard, session) = logged_in(FakeApi::new(), true).await;
        let batch = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];

        let report = dashboard.add_hosts(&session, &batch, true).await.unwrap();
        assert_eq!(report.added, batch);
        assert!(report.summary().starts_with("Successfully added 2 hosts\n"));

        assert_eq!(
            dashboard.api().calls(),
            vec![
                Call::AddHosts {
                    addresses: batch,
                    auto_precheck: true
                },
                Call::ListHosts { authorized: true },
            ]
        );
        assert_eq!(dashboard.view().statistics.total, 2);
    }

    #[tokio::test]
    async fn test_add_hosts_validation_sends_nothing() {
        let (dashboard, session) = logged_in(FakeApi::new(), true).await;

        let empty = dashboard.add_hosts(&session, &[], true).await;
        assert!(matches!(
            empty,
            Err(DashboardError::Validation(ValidationError::NoHosts))
        ));

        let mixed = vec!["999.999.999.999".to_string(), "10.0.0".to_string()];
        match dashboard.add_hosts(&session, &mixed, false).await {
            Err(DashboardError::Validation(ValidationError::InvalidAddresses(bad))) => {
                assert_eq!(bad, vec!["10.0.0"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(dashboard.api().calls().is_empty());

        // out-of-range octets still pass the shape check
        let wide = vec!["999.999.999.999".to_string()];
        dashboard.add_hosts(&session, &wide, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_phase1_requires_patch_and_selection() {
        let (dashboard, session) = logged_in(FakeApi::new().with_hosts(&["10.0.0.1"]), true).await;

        let no_patch = dashboard
            .run_phase1(&session, &set(&["10.0.0.1"]), &PatchChoice::default())
            .await;
        assert!(matches!(
            no_patch,
            Err(DashboardError::Validation(ValidationError::NoPatchSelected))
        ));

        let no_hosts = dashboard
            .run_phase1(&session, &BTreeSet::new(), &PatchChoice::catalog("depot.zip"))
            .await;
        assert!(matches!(
            no_hosts,
            Err(DashboardError::Validation(ValidationError::EmptySelection))
        ));
        assert!(dashboard.api().calls().is_empty());

        let sent = dashboard
            .run_phase1(
                &session,
                &set(&["10.0.0.1"]),
                &PatchChoice::upload("/tmp/VMware-ESXi-8.0U2-depot.zip"),
            )
            .await
            .unwrap();
        assert_eq!(sent, Dispatch::Sent);
        assert_eq!(
            dashboard.api().calls()[0],
            Call::Phase1 {
                hosts: vec!["10.0.0.1".into()],
                patch_file: "VMware-ESXi-8.0U2-depot.zip".into()
            }
        );
    }

    #[tokio::test]
    async fn test_commands_reject_hosts_outside_last_fetch() {
        let (dashboard, session) = logged_in(FakeApi::new().with_hosts(&["10.0.0.1"]), true).await;

        let result = dashboard
            .run_prechecks(&session, &set(&["10.0.0.1", "10.0.0.7"]))
            .await;
        assert!(matches!(
            result,
            Err(DashboardError::Validation(ValidationError::UnknownHost(ip))) if ip == "10.0.0.7"
        ));
        assert!(dashboard.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_declined_confirmation_sends_nothing() {
        let (dashboard, session) =
            logged_in(FakeApi::new().with_hosts(&["10.0.0.5"]), false).await;

        assert_eq!(
            dashboard.remove_host(&session, "10.0.0.5").await.unwrap(),
            Dispatch::Declined
        );
        assert_eq!(
            dashboard.delete_patch(&session, "depot.zip").await.unwrap(),
            Dispatch::Declined
        );
        assert_eq!(
            dashboard
                .run_phase2(&session, &set(&["10.0.0.5"]))
                .await
                .unwrap(),
            Dispatch::Declined
        );
        assert_eq!(dashboard.refresh_every_host(Some(&session)).await.unwrap(), None);
        assert!(dashboard.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_host_confirmed_refreshes() {
        let (dashboard, session) =
            logged_in(FakeApi::new().with_hosts(&["10.0.0.5", "10.0.0.6"]), true).await;

        let sent = dashboard.remove_host(&session, "10.0.0.5").await.unwrap();
        assert_eq!(sent, Dispatch::Sent);

        let calls = dashboard.api().calls();
        assert_eq!(calls[0], Call::RemoveHost("10.0.0.5".into()));
        assert_eq!(calls[1], Call::ListHosts { authorized: true });
        assert_eq!(dashboard.view().hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_server_detail_is_surfaced() {
        let (dashboard, session) = logged_in(FakeApi::new().with_hosts(&["10.0.0.1"]), true).await;
        dashboard.api().fail_next(400, "Host 10.0.0.1 has not passed pre-checks");

        let err = dashboard
            .run_phase2(&session, &set(&["10.0.0.1"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Host 10.0.0.1 has not passed pre-checks (HTTP 400)"
        );
        // no refresh after a failed command
        assert_eq!(dashboard.api().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_zip_locally() {
        let (dashboard, session) = logged_in(FakeApi::new(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("patch.txt");
        std::fs::write(&text, b"not a depot").unwrap();

        let (progress, mut events) = UploadProgress::channel();
        let result = dashboard.upload_patch(&session, &text, progress).await;
        assert!(matches!(
            result,
            Err(DashboardError::Validation(ValidationError::NotADepot(_)))
        ));
        assert!(dashboard.api().calls().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_upload_reports_progress_and_completion() {
        let (dashboard, session) = logged_in(FakeApi::new(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let depot = dir.path().join("patch.zip");
        std::fs::write(&depot, vec![0u8; 2048]).unwrap();

        let (progress, mut events) = UploadProgress::channel();
        dashboard
            .upload_patch(&session, &depot, progress)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                UploadEvent::Started {
                    filename: "patch.zip".into(),
                    total_bytes: 2048
                },
                UploadEvent::Progress(0),
                UploadEvent::Progress(50),
                UploadEvent::Progress(100),
                UploadEvent::Completed {
                    filename: "patch.zip".into()
                },
            ]
        );
        assert_eq!(dashboard.view().patches[0].filename, "patch.zip");
    }

    #[tokio::test]
    async fn test_refresh_every_host() {
        let (dashboard, _session) =
            logged_in(FakeApi::new().with_hosts(&["10.0.0.1", "10.0.0.2"]), true).await;

        let refreshed = dashboard.refresh_every_host(None).await.unwrap();
        assert_eq!(refreshed, Some(2));
        assert_eq!(
            dashboard
                .api()
                .count(|call| matches!(call, Call::RefreshHost(_))),
            2
        );
    }

    #[tokio::test]
    async fn test_save_settings_passthrough() {
        let (dashboard, session) = logged_in(FakeApi::new(), true).await;
        let settings: Settings = [
            ("auto_phase2_window".to_string(), "10".to_string()),
            ("custom_key".to_string(), "anything goes".to_string()),
        ]
        .into();

        dashboard.save_settings(&session, &settings).await.unwrap();
        assert_eq!(dashboard.api().calls(), vec![Call::SaveSettings(settings)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_does_not_overwrite_newer_one() {
        let api = FakeApi::new();
        api.script_host_list(Duration::from_secs(5), &["10.0.0.1"]);
        api.script_host_list(Duration::ZERO, &["10.0.0.2"]);
        let dashboard = Arc::new(dashboard(api, true));

        let slow = tokio::spawn({
            let dashboard = dashboard.clone();
            async move { dashboard.load_hosts(None).await }
        });
        // let the slow request take its ticket first
        tokio::task::yield_now().await;
        dashboard.load_hosts(None).await.unwrap();
        slow.await.unwrap().unwrap();

        let view = dashboard.view();
        assert_eq!(view.hosts.len(), 1);
        assert_eq!(view.hosts[0].ip_address, "10.0.0.2");
    }
}
