//! Authentication module for the acd_cli OAuth token
//!
//! Obtains the token by emulating a browser sign-in against the OAuth
//! endpoint, then hands it to the credential store.

pub mod bootstrap;
pub mod credential;
pub mod error;
pub mod form;
pub mod login;

use std::fmt;
use std::time::Duration;

pub use bootstrap::{clear, refresh, status, RefreshOutcome};
pub use credential::Credential;
pub use error::AuthError;
pub use login::authenticate;

/// Default OAuth endpoint serving the acd_cli sign-in page
pub const DEFAULT_ENDPOINT: &str = "https://tensile-runway-92512.appspot.com/";

/// Desktop browser identity presented to the provider.
///
/// The provider blocks the user agent (not the cookies) after repeated
/// failures, so this is configurable.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// HTTP request timeout in seconds, applied to every request of an attempt
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Everything one login attempt needs
#[derive(Clone)]
pub struct LoginConfig {
    /// OAuth endpoint serving the sign-in form
    pub endpoint: String,
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl LoginConfig {
    pub fn new(endpoint: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            email: email.into(),
            password: password.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("endpoint", &self.endpoint)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}
