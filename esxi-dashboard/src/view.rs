//! View state and the pure reducer that turns API responses into a view-model
//!
//! Handles:
//! - The mirror of the last successful host/job/patch fetch
//! - Stale-response rejection through per-resource generation tickets
//! - Host selection, always a subset of the mirrored hosts
//! - Reduction to display rows, statistics and admin affordances

use chrono::{DateTime, Local, Utc};
use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::models::{Host, HostStatus, Job, Patch};

const PLACEHOLDER: &str = "-";

/// A resource list tagged with the refresh ticket that produced it
#[derive(Debug, Clone)]
struct Versioned<T> {
    items: Vec<T>,
    generation: u64,
    loaded: bool,
}

impl<T> Default for Versioned<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
            loaded: false,
        }
    }
}

impl<T> Versioned<T> {
    /// Applies `items` unless a newer ticket already landed
    fn apply(&mut self, generation: u64, items: Vec<T>) -> bool {
        if self.loaded && generation < self.generation {
            return false;
        }
        self.items = items;
        self.generation = generation;
        self.loaded = true;
        true
    }
}

/// Session-scoped mirror of the orchestrator state
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    hosts: Versioned<Host>,
    jobs: Versioned<Job>,
    patches: Versioned<Patch>,
    selection: BTreeSet<String>,
    admin_user: Option<String>,
}

impl ViewState {
    pub fn hosts(&self) -> &[Host] {
        &self.hosts.items
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs.items
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches.items
    }

    /// Replaces the host mirror and drops selections whose host vanished.
    /// Returns false when the response was stale and ignored.
    pub fn apply_hosts(&mut self, generation: u64, hosts: Vec<Host>) -> bool {
        if !self.hosts.apply(generation, hosts) {
            return false;
        }
        let known: BTreeSet<&str> = self.hosts.items.iter().map(|h| h.ip_address.as_str()).collect();
        self.selection.retain(|ip| known.contains(ip.as_str()));
        true
    }

    pub fn apply_jobs(&mut self, generation: u64, jobs: Vec<Job>) -> bool {
        self.jobs.apply(generation, jobs)
    }

    pub fn apply_patches(&mut self, generation: u64, patches: Vec<Patch>) -> bool {
        self.patches.apply(generation, patches)
    }

    pub fn is_admin(&self) -> bool {
        self.admin_user.is_some()
    }

    pub fn admin_user(&self) -> Option<&str> {
        self.admin_user.as_deref()
    }

    pub fn grant_admin(&mut self, username: &str) {
        self.admin_user = Some(username.to_string());
    }

    pub fn revoke_admin(&mut self) {
        self.admin_user = None;
        self.selection.clear();
    }

    pub fn knows_host(&self, ip: &str) -> bool {
        self.hosts.items.iter().any(|host| host.ip_address == ip)
    }

    pub fn select(&mut self, ip: &str) -> Result<(), ValidationError> {
        if !self.knows_host(ip) {
            return Err(ValidationError::UnknownHost(ip.to_string()));
        }
        self.selection.insert(ip.to_string());
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selection = self
            .hosts
            .items
            .iter()
            .map(|host| host.ip_address.clone())
            .collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    /// Checks a command's target set against the last successful host fetch
    pub fn resolve_targets(
        &self,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<String>, ValidationError> {
        if selected.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        if let Some(unknown) = selected.iter().find(|ip| !self.knows_host(ip)) {
            return Err(ValidationError::UnknownHost(unknown.clone()));
        }
        Ok(selected.iter().cloned().collect())
    }

    pub fn view(&self) -> DashboardView {
        DashboardView::reduce(
            self.hosts(),
            self.jobs(),
            self.patches(),
            &self.selection,
            self.admin_user(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRow {
    pub selected: bool,
    pub ip_address: String,
    pub hostname: String,
    pub current_build: String,
    pub target_build: String,
    pub status: String,
    pub failed: bool,
    pub ssh: &'static str,
    pub last_checked: String,
    pub removable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub precheck_passed: usize,
    pub phase1_completed: usize,
    pub fully_patched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub host_ip: String,
    pub job_type: String,
    pub status: String,
    pub started: String,
    pub completed: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJobCard {
    pub title: String,
    pub started: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRow {
    pub filename: String,
    pub size: String,
    pub uploaded: String,
}

/// Which admin-only controls are shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Affordances {
    pub add_hosts: bool,
    pub patch_upload: bool,
    pub remove_hosts: bool,
    pub patching: bool,
    pub settings: bool,
    pub login: bool,
    pub logout: bool,
}

impl Affordances {
    pub fn for_admin(is_admin: bool) -> Self {
        Self {
            add_hosts: is_admin,
            patch_upload: is_admin,
            remove_hosts: is_admin,
            patching: is_admin,
            settings: is_admin,
            login: !is_admin,
            logout: is_admin,
        }
    }
}

/// Render-ready view-model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub user: Option<String>,
    pub affordances: Affordances,
    pub statistics: Statistics,
    pub hosts: Vec<HostRow>,
    pub jobs: Vec<JobRow>,
    pub running: Vec<RunningJobCard>,
    pub patches: Vec<PatchRow>,
}

impl DashboardView {
    pub fn reduce(
        hosts: &[Host],
        jobs: &[Job],
        patches: &[Patch],
        selection: &BTreeSet<String>,
        admin_user: Option<&str>,
    ) -> Self {
        let is_admin = admin_user.is_some();

        Self {
            user: admin_user.map(str::to_string),
            affordances: Affordances::for_admin(is_admin),
            statistics: statistics(hosts),
            hosts: hosts
                .iter()
                .map(|host| host_row(host, selection.contains(&host.ip_address), is_admin))
                .collect(),
            jobs: jobs.iter().map(job_row).collect(),
            running: jobs
                .iter()
                .filter(|job| job.is_running())
                .map(|job| RunningJobCard {
                    title: format!("{} - {}", job.job_type, job.host_ip),
                    started: format_time(&job.started_at),
                })
                .collect(),
            patches: patches.iter().map(patch_row).collect(),
        }
    }
}

pub fn statistics(hosts: &[Host]) -> Statistics {
    let count = |wanted: HostStatus| {
        hosts
            .iter()
            .filter(|host| host.status.as_ref() == Some(&wanted))
            .count()
    };

    Statistics {
        total: hosts.len(),
        precheck_passed: count(HostStatus::PreCheckPassed),
        phase1_completed: count(HostStatus::Phase1Completed),
        fully_patched: count(HostStatus::PatchingCompleted),
    }
}

fn host_row(host: &Host, selected: bool, is_admin: bool) -> HostRow {
    let status = host.effective_status();
    HostRow {
        selected,
        ip_address: host.ip_address.clone(),
        hostname: or_placeholder(host.hostname.as_deref()),
        current_build: or_placeholder(host.current_build.as_deref()),
        target_build: or_placeholder(host.target_build.as_deref()),
        failed: status.is_failure(),
        status: status.to_string(),
        ssh: if host.ssh_enabled { "✓" } else { "✗" },
        last_checked: host
            .last_checked
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        removable: is_admin,
    }
}

fn job_row(job: &Job) -> JobRow {
    JobRow {
        host_ip: job.host_ip.clone(),
        job_type: job.job_type.to_string(),
        status: job.status.to_string(),
        started: format_time(&job.started_at),
        completed: job
            .completed_at
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        error: or_placeholder(job.error_message.as_deref()),
    }
}

fn patch_row(patch: &Patch) -> PatchRow {
    PatchRow {
        filename: patch.filename.clone(),
        size: format!("{} MB", patch.size),
        uploaded: patch
            .uploaded_at()
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    }
}

fn or_placeholder(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
