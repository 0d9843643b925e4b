//! Explicit session context
//!
//! A `Session` is only produced by a successful authentication and is passed
//! by reference to every command. Dropping it (logout) discards the
//! credential; nothing is kept in ambient state.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// Username/password pair, encoded as a Basic credential on each request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `base64(username:password)`
    pub fn token(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Basic {}", self.token())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session, granting the admin view
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
}

impl Session {
    pub(crate) fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Any authenticated session holds admin rights; the backend enforces
    /// the rest.
    pub fn is_admin(&self) -> bool {
        true
    }
}
