//! In-memory orchestrator used by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::api::{OrchestratorApi, PatchUpload};
use crate::error::ApiError;
use crate::models::{AddHostsResponse, Host, Job, JobWindow, Patch, Settings};
use crate::session::Credentials;
use crate::upload::UploadProgress;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "VMware1!";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListHosts { authorized: bool },
    AddHosts { addresses: Vec<String>, auto_precheck: bool },
    RemoveHost(String),
    RefreshHost(String),
    ListJobs(JobWindow),
    Precheck(Vec<String>),
    Phase1 { hosts: Vec<String>, patch_file: String },
    Phase2(Vec<String>),
    ListPatches,
    UploadPatch(String),
    DeletePatch(String),
    SaveSettings(Settings),
}

pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    hosts: Mutex<Vec<Host>>,
    jobs: Mutex<Vec<Job>>,
    patches: Mutex<Vec<Patch>>,
    scripted_host_lists: Mutex<VecDeque<(Duration, Vec<Host>)>>,
    next_failure: Mutex<Option<(u16, String)>>,
    valid: Credentials,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hosts: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
            scripted_host_lists: Mutex::new(VecDeque::new()),
            next_failure: Mutex::new(None),
            valid: Credentials::new(USERNAME, PASSWORD),
        }
    }

    pub fn with_hosts(self, ips: &[&str]) -> Self {
        *self.hosts.lock() = ips.iter().map(|ip| Host::new(*ip)).collect();
        self
    }

    pub fn with_jobs(self, jobs: Vec<Job>) -> Self {
        *self.jobs.lock() = jobs;
        self
    }

    pub fn with_patches(self, patches: Vec<Patch>) -> Self {
        *self.patches.lock() = patches;
        self
    }

    /// Next `list_hosts` answers `hosts` after `delay`
    pub fn script_host_list(&self, delay: Duration, hosts: &[&str]) {
        self.scripted_host_lists
            .lock()
            .push_back((delay, hosts.iter().map(|ip| Host::new(*ip)).collect()));
    }

    /// Next call (command or list) fails with `status` and `detail`
    pub fn fail_next(&self, status: u16, detail: &str) {
        *self.next_failure.lock() = Some((status, detail.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matcher(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, auth: Option<&Credentials>) -> Result<(), ApiError> {
        if let Some(credentials) = auth {
            if credentials != &self.valid {
                return Err(ApiError::rejected(401, Some("Invalid credentials".into())));
            }
        }
        if let Some((status, detail)) = self.next_failure.lock().take() {
            return Err(ApiError::rejected(status, Some(detail)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrchestratorApi for FakeApi {
    async fn list_hosts(&self, auth: Option<&Credentials>) -> Result<Vec<Host>, ApiError> {
        self.record(Call::ListHosts {
            authorized: auth.is_some(),
        });
        self.check(auth)?;
        let scripted = self.scripted_host_lists.lock().pop_front();
        match scripted {
            Some((delay, hosts)) => {
                tokio::time::sleep(delay).await;
                Ok(hosts)
            }
            None => Ok(self.hosts.lock().clone()),
        }
    }

    async fn add_hosts(
        &self,
        auth: &Credentials,
        addresses: &[String],
        auto_precheck: bool,
    ) -> Result<AddHostsResponse, ApiError> {
        self.record(Call::AddHosts {
            addresses: addresses.to_vec(),
            auto_precheck,
        });
        self.check(Some(auth))?;

        let mut hosts = self.hosts.lock();
        let mut added = Vec::new();
        for ip in addresses {
            if !hosts.iter().any(|h| &h.ip_address == ip) {
                hosts.push(Host::new(ip.clone()));
                added.push(ip.clone());
            }
        }
        Ok(AddHostsResponse {
            precheck_status: auto_precheck
                .then(|| format!("Pre-checks started for {} hosts", added.len())),
            message: Some(format!("Added {} hosts", added.len())),
            hosts: added,
        })
    }

    async fn remove_host(&self, auth: &Credentials, ip: &str) -> Result<(), ApiError> {
        self.record(Call::RemoveHost(ip.to_string()));
        self.check(Some(auth))?;
        self.hosts.lock().retain(|h| h.ip_address != ip);
        Ok(())
    }

    async fn refresh_host(&self, auth: Option<&Credentials>, ip: &str) -> Result<(), ApiError> {
        self.record(Call::RefreshHost(ip.to_string()));
        self.check(auth)
    }

    async fn list_jobs(
        &self,
        auth: Option<&Credentials>,
        window: JobWindow,
    ) -> Result<Vec<Job>, ApiError> {
        self.record(Call::ListJobs(window));
        self.check(auth)?;
        Ok(self.jobs.lock().clone())
    }

    async fn run_precheck(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError> {
        self.record(Call::Precheck(hosts.to_vec()));
        self.check(Some(auth))
    }

    async fn run_phase1(
        &self,
        auth: &Credentials,
        hosts: &[String],
        patch_file: &str,
    ) -> Result<(), ApiError> {
        self.record(Call::Phase1 {
            hosts: hosts.to_vec(),
            patch_file: patch_file.to_string(),
        });
        self.check(Some(auth))
    }

    async fn run_phase2(&self, auth: &Credentials, hosts: &[String]) -> Result<(), ApiError> {
        self.record(Call::Phase2(hosts.to_vec()));
        self.check(Some(auth))
    }

    async fn list_patches(&self, _auth: Option<&Credentials>) -> Result<Vec<Patch>, ApiError> {
        self.record(Call::ListPatches);
        Ok(self.patches.lock().clone())
    }

    async fn upload_patch(
        &self,
        auth: &Credentials,
        upload: &PatchUpload,
        mut progress: UploadProgress,
    ) -> Result<(), ApiError> {
        self.record(Call::UploadPatch(upload.filename.clone()));
        self.check(Some(auth))?;
        for loaded in [0, 50, 100] {
            progress.advance(loaded, 100);
        }
        self.patches.lock().push(Patch {
            filename: upload.filename.clone(),
            size: 0.1,
            uploaded: 1_700_000_000.0,
        });
        Ok(())
    }

    async fn delete_patch(&self, auth: &Credentials, filename: &str) -> Result<(), ApiError> {
        self.record(Call::DeletePatch(filename.to_string()));
        self.check(Some(auth))?;
        self.patches.lock().retain(|p| p.filename != filename);
        Ok(())
    }

    async fn save_settings(&self, auth: &Credentials, settings: &Settings) -> Result<(), ApiError> {
        self.record(Call::SaveSettings(settings.clone()));
        self.check(Some(auth))
    }
}
