//! Orchestrator data model as served by the REST API
//!
//! Every entity here is owned by the orchestrator backend. The dashboard only
//! keeps the copy returned by the last successful fetch and never caches it
//! beyond the next poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Write-only settings map sent to `POST /settings`
pub type Settings = BTreeMap<String, String>;

pub const SETTING_AUTO_PHASE2_WINDOW: &str = "auto_phase2_window";
pub const SETTING_REBOOT_GRACE_PERIOD: &str = "reboot_grace_period";

/// Patch lifecycle status of a host.
///
/// The backend owns this vocabulary; values the dashboard does not know are
/// kept verbatim and rendered as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostStatus {
    Pending,
    PreCheckPassed,
    PreCheckFailed,
    Phase1Completed,
    Phase1Failed,
    PatchingCompleted,
    Phase2Failed,
    Other(String),
}

impl HostStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HostStatus::Pending => "pending",
            HostStatus::PreCheckPassed => "pre_check_passed",
            HostStatus::PreCheckFailed => "pre_check_failed",
            HostStatus::Phase1Completed => "phase1_completed",
            HostStatus::Phase1Failed => "phase1_failed",
            HostStatus::PatchingCompleted => "patching_completed",
            HostStatus::Phase2Failed => "phase2_failed",
            HostStatus::Other(raw) => raw,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            HostStatus::PreCheckFailed | HostStatus::Phase1Failed | HostStatus::Phase2Failed
        )
    }
}

impl From<String> for HostStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => HostStatus::Pending,
            "pre_check_passed" => HostStatus::PreCheckPassed,
            "pre_check_failed" => HostStatus::PreCheckFailed,
            "phase1_completed" => HostStatus::Phase1Completed,
            "phase1_failed" => HostStatus::Phase1Failed,
            "patching_completed" => HostStatus::PatchingCompleted,
            "phase2_failed" => HostStatus::Phase2Failed,
            _ => HostStatus::Other(raw),
        }
    }
}

impl From<HostStatus> for String {
    fn from(status: HostStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of background job run by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    PreCheck,
    Phase1,
    Phase2,
    Refresh,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::PreCheck => "pre_check",
            JobType::Phase1 => "phase1",
            JobType::Phase2 => "phase2",
            JobType::Refresh => "refresh",
            JobType::Other(raw) => raw,
        }
    }
}

impl From<String> for JobType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pre_check" | "precheck" => JobType::PreCheck,
            "phase1" => JobType::Phase1,
            "phase2" => JobType::Phase2,
            "refresh" => JobType::Refresh,
            _ => JobType::Other(raw),
        }
    }
}

impl From<JobType> for String {
    fn from(kind: JobType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "running" => JobStatus::Running,
            // the backend reports finished jobs as "success"
            "completed" | "success" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Other(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ESXi host tracked by the orchestrator, keyed by `ip_address`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub current_build: Option<String>,
    #[serde(default)]
    pub target_build: Option<String>,
    #[serde(default)]
    pub status: Option<HostStatus>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub ssh_enabled: bool,
    #[serde(default, with = "timestamp::option")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub datastore: Option<String>,
    #[serde(default)]
    pub datastore_free_gb: Option<f64>,
}

impl Host {
    /// Host as first registered, before any check ran
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            hostname: None,
            current_build: None,
            target_build: None,
            status: None,
            ssh_enabled: false,
            last_checked: None,
            datastore: None,
            datastore_free_gb: None,
        }
    }

    /// Status with the implicit `pending` default applied
    pub fn effective_status(&self) -> HostStatus {
        self.status.clone().unwrap_or(HostStatus::Pending)
    }
}

/// Background job record (pre-check, phase1, phase2, refresh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: Option<u64>,
    pub host_ip: String,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub patch_file: Option<String>,
}

impl Job {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

/// Uploaded depot file usable as Phase 1 input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub filename: String,
    /// Size in MB
    pub size: f64,
    /// Upload time in epoch seconds
    pub uploaded: f64,
}

impl Patch {
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.uploaded.trunc() as i64;
        let nanos = (self.uploaded.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

/// Body of `POST /hosts/add` and `POST /precheck`
#[derive(Debug, Serialize)]
pub struct HostBatch<'a> {
    pub ip_addresses: &'a [String],
}

/// Body of `POST /patch/phase1`
#[derive(Debug, Serialize)]
pub struct StageRequest<'a> {
    pub hosts: &'a [String],
    pub patch_file: &'a str,
}

/// Body of `POST /patch/phase2`
#[derive(Debug, Serialize)]
pub struct RebootRequest<'a> {
    pub hosts: &'a [String],
}

/// Response of `POST /hosts/add`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddHostsResponse {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub precheck_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Time window applied to the job history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobWindow {
    #[default]
    All,
    Days(u32),
}

impl JobWindow {
    /// Converts an hours filter to the whole-day window the API accepts.
    /// Windows shorter than a day round up to one day.
    pub fn from_hours(hours: Option<u32>) -> Self {
        match hours {
            None => JobWindow::All,
            Some(hours) => JobWindow::Days((hours / 24).max(1)),
        }
    }

    /// Value of the `filter_days` query parameter, if any
    pub fn filter_days(&self) -> Option<u32> {
        match self {
            JobWindow::All => None,
            JobWindow::Days(days) => Some(*days),
        }
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Timestamps arrive either as RFC 3339 or as naive ISO-8601 in UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_host_from_backend_row() {
        let json = serde_json::json!({
            "id": 3,
            "ip_address": "10.0.0.5",
            "hostname": null,
            "current_build": "VMware ESXi 7.0.3 build-21930508",
            "status": "pre_check_passed",
            "ssh_enabled": null,
            "last_checked": "2024-05-01T10:15:30.123456",
            "datastore_free_gb": 120.5
        });

        let host: Host = serde_json::from_value(json).unwrap();
        assert_eq!(host.ip_address, "10.0.0.5");
        assert_eq!(host.status, Some(HostStatus::PreCheckPassed));
        assert!(!host.ssh_enabled);
        assert_eq!(host.hostname, None);
        let checked = host.last_checked.unwrap();
        assert_eq!((checked.hour(), checked.minute(), checked.second()), (10, 15, 30));
    }

    #[test]
    fn test_unknown_status_kept_verbatim() {
        let host: Host = serde_json::from_value(serde_json::json!({
            "ip_address": "10.0.0.9",
            "status": "maintenance_mode"
        }))
        .unwrap();
        assert_eq!(host.effective_status().as_str(), "maintenance_mode");

        let missing = Host::new("10.0.0.10");
        assert_eq!(missing.effective_status(), HostStatus::Pending);
    }

    #[test]
    fn test_job_aliases() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "host_ip": "10.0.0.1",
            "job_type": "precheck",
            "status": "success",
            "started_at": "2024-05-01T10:00:00Z",
            "completed_at": "2024-05-01 10:02:00"
        }))
        .unwrap();
        assert_eq!(job.job_type, JobType::PreCheck);
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.is_running());
        assert_eq!(job.completed_at.unwrap().minute(), 2);
    }

    #[test]
    fn test_invalid_started_at_is_rejected() {
        let parsed: Result<Job, _> = serde_json::from_value(serde_json::json!({
            "host_ip": "10.0.0.1",
            "job_type": "phase1",
            "status": "running",
            "started_at": "yesterday"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_patch_upload_time() {
        let patch = Patch {
            filename: "VMware-ESXi-8.0U2-22380479-depot.zip".into(),
            size: 612.4,
            uploaded: 1_700_000_000.0,
        };
        assert_eq!(patch.uploaded_at().unwrap().year(), 2023);
    }

    #[test]
    fn test_job_window_from_hours() {
        assert_eq!(JobWindow::from_hours(None), JobWindow::All);
        assert_eq!(JobWindow::from_hours(Some(168)).filter_days(), Some(7));
        assert_eq!(JobWindow::from_hours(Some(6)).filter_days(), Some(1));
        assert_eq!(JobWindow::All.filter_days(), None);
    }
}
