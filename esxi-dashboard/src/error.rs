//! Error taxonomy of the dashboard
//!
//! Every error terminates at the user action that triggered it and is shown
//! once; its `Display` text is that notification.

use std::path::PathBuf;

/// Credential check failed. Rejection and unreachable backend are reported
/// the same way.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Input rejected locally, before any request is sent
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter at least one IP address")]
    NoHosts,
    #[error("Invalid IP addresses: {}", .0.join(", "))]
    InvalidAddresses(Vec<String>),
    #[error("Please select hosts")]
    EmptySelection,
    #[error("Host {0} is not in the current host list")]
    UnknownHost(String),
    #[error("Please select or upload a patch file first")]
    NoPatchSelected,
    #[error("Please select a valid ESXi depot file (.zip), got {0}")]
    NotADepot(String),
    #[error("Patch file not found: {}", .0.display())]
    MissingFile(PathBuf),
}

/// Failure talking to the orchestrator API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", rejection_message(.status, .detail))]
    Rejected { status: u16, detail: Option<String> },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    pub fn rejected(status: u16, detail: Option<String>) -> Self {
        ApiError::Rejected { status, detail }
    }

    /// Server-supplied `detail` text, when the response carried one
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn rejection_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("{detail} (HTTP {status})"),
        None => format!("Unknown error (HTTP {status})"),
    }
}

/// Error returned by dashboard operations
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl DashboardError {
    /// True when the error was raised locally and nothing reached the network
    pub fn is_local(&self) -> bool {
        matches!(self, DashboardError::Validation(_))
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_passthrough_in_message() {
        let err = ApiError::rejected(409, Some("Host already exists".into()));
        assert_eq!(err.to_string(), "Host already exists (HTTP 409)");
        assert_eq!(err.detail(), Some("Host already exists"));

        let bare = ApiError::rejected(500, None);
        assert_eq!(bare.to_string(), "Unknown error (HTTP 500)");
    }

    #[test]
    fn test_invalid_addresses_message() {
        let err = ValidationError::InvalidAddresses(vec!["10.0.0".into(), "host-a".into()]);
        assert_eq!(err.to_string(), "Invalid IP addresses: 10.0.0, host-a");
        assert!(DashboardError::from(err).is_local());
    }
}
