//! Local input checks run before anything reaches the network

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::ValidationError;

/// Dotted-quad shape only: 1 to 3 digits per octet, no range check.
static DOTTED_QUAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("dotted-quad pattern is valid")
});

pub fn is_dotted_quad(candidate: &str) -> bool {
    DOTTED_QUAD.is_match(candidate)
}

/// Splits free-form input (one address per line) into trimmed, non-empty entries
pub fn parse_address_list(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Checks a batch of addresses. The whole batch is rejected if any entry is
/// malformed; the error lists every offending entry.
pub fn validate_addresses(addresses: &[String]) -> Result<(), ValidationError> {
    if addresses.is_empty() {
        return Err(ValidationError::NoHosts);
    }

    let invalid: Vec<String> = addresses
        .iter()
        .filter(|ip| !is_dotted_quad(ip))
        .cloned()
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddresses(invalid))
    }
}

/// Returns the depot file name if `path` names an existing `.zip` file
pub fn validate_depot(path: &Path) -> Result<String, ValidationError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ValidationError::MissingFile(path.to_path_buf()))?;

    if !filename.ends_with(".zip") {
        return Err(ValidationError::NotADepot(filename));
    }

    if !path.is_file() {
        return Err(ValidationError::MissingFile(path.to_path_buf()));
    }

    Ok(filename)
}
