//! Read-only password database backed by a text file.
//!
//! Each non-comment line is `username:bcrypt-hash[:role,role...]`.
//! Usernames are matched case-insensitively.

use std::collections::HashMap;
use std::path::Path;

use super::{Authenticator, Credentials};
use crate::net::Session;

/// Error type for loading the password database.
#[derive(Debug, thiserror::Error)]
pub enum PasswordFileError {
    #[error("Unable to read password database {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Password database {0} contains no users")]
    Empty(String),
}

#[derive(Debug, Clone)]
struct UserRecord {
    password_hash: String,
    roles: Vec<String>,
}

/// Authenticator over a file of bcrypt password hashes.
#[derive(Debug, Clone, Default)]
pub struct PasswordFileAuthenticator {
    users: HashMap<String, UserRecord>,
}

impl PasswordFileAuthenticator {
    /// Load and parse the password file.
    pub fn load(path: &Path) -> Result<Self, PasswordFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| PasswordFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let authenticator = Self::parse(&content);
        if authenticator.users.is_empty() {
            return Err(PasswordFileError::Empty(path.display().to_string()));
        }
        tracing::info!(
            path = %path.display(),
            users = authenticator.users.len(),
            "Password database loaded"
        );
        Ok(authenticator)
    }

    /// Parse password file content. Malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut users = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, ':');
            let (Some(username), Some(hash)) = (parts.next(), parts.next()) else {
                tracing::warn!(line = line_no + 1, "Skipping malformed password entry");
                continue;
            };
            if username.is_empty() || hash.is_empty() {
                tracing::warn!(line = line_no + 1, "Skipping malformed password entry");
                continue;
            }
            let roles = parts
                .next()
                .map(|roles| {
                    roles
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            users.insert(
                username.to_lowercase(),
                UserRecord {
                    password_hash: hash.to_string(),
                    roles,
                },
            );
        }
        Self { users }
    }
}

impl Authenticator for PasswordFileAuthenticator {
    fn authenticate(&self, credentials: &Credentials, session: &Session) -> bool {
        let Some(user) = self.users.get(&credentials.username.to_lowercase()) else {
            return false;
        };
        match bcrypt::verify(&credentials.password, &user.password_hash) {
            Ok(true) => {
                tracing::debug!(
                    connection_id = %session.id(),
                    username = %credentials.username,
                    roles = ?user.roles,
                    "Password verified"
                );
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(
                    connection_id = %session.id(),
                    username = %credentials.username,
                    error = %e,
                    "Stored password hash is unusable"
                );
                false
            }
        }
    }
}
