//! Single-user authenticator.

use constant_time_eq::constant_time_eq;

use super::{Authenticator, Credentials};
use crate::net::Session;

/// Accepts exactly one username/password pair.
#[derive(Clone)]
pub struct StaticAuthenticator {
    username: String,
    password: String,
}

impl StaticAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, credentials: &Credentials, _session: &Session) -> bool {
        credentials.username == self.username
            && constant_time_eq(credentials.password.as_bytes(), self.password.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_configured_pair() {
        let auth = StaticAuthenticator::new("user", "secret");
        let session = Session::new("192.0.2.10:5000".parse().unwrap());

        assert!(auth.authenticate(&Credentials::new("user", "secret"), &session));
        assert!(!auth.authenticate(&Credentials::new("user", "secrets"), &session));
        assert!(!auth.authenticate(&Credentials::new("other", "secret"), &session));
    }

    #[test]
    fn password_prefix_and_empty_are_rejected() {
        let auth = StaticAuthenticator::new("user", "secret");
        let session = Session::new("192.0.2.10:5000".parse().unwrap());

        assert!(!auth.authenticate(&Credentials::new("user", "secre"), &session));
        assert!(!auth.authenticate(&Credentials::new("user", ""), &session));
    }
}
