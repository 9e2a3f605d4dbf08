//! Credential checks the gate wraps.
//!
//! The shell server owns authentication; this module only defines the seam
//! (`Authenticator`) and the two credential stores the gate binary ships with.

pub mod password_file;
pub mod simple;

use std::sync::Arc;

use crate::config::{AuthConfig, AuthMode};
use crate::net::Session;

pub use password_file::{PasswordFileAuthenticator, PasswordFileError};
pub use simple::StaticAuthenticator;

/// Username/password pair submitted by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// External credential check.
///
/// Implementations may block (password hashing); the gateway calls them on
/// the blocking pool.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials, session: &Session) -> bool;
}

impl<A: Authenticator + ?Sized> Authenticator for Arc<A> {
    fn authenticate(&self, credentials: &Credentials, session: &Session) -> bool {
        (**self).authenticate(credentials, session)
    }
}

/// Build the authenticator selected by `auth.mode`.
pub fn from_config(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, PasswordFileError> {
    match config.mode {
        AuthMode::Simple => Ok(Arc::new(StaticAuthenticator::new(
            config.username.clone(),
            config.password.clone(),
        ))),
        AuthMode::PasswordFile => {
            let authenticator = PasswordFileAuthenticator::load(&config.password_file)?;
            Ok(Arc::new(authenticator))
        }
    }
}
