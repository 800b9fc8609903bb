//! Credential obtained from the identity provider

use std::fmt;
use std::time::SystemTime;

use serde_json::{Map, Value};

/// Token payload plus the time it was acquired.
///
/// The payload is whatever JSON object the provider returned; it is handed
/// to acd_cli verbatim and never interpreted here. There are no setters: a
/// refresh produces a new `Credential`.
#[derive(Clone, PartialEq)]
pub struct Credential {
    token: Map<String, Value>,
    obtained_at: SystemTime,
}

impl Credential {
    pub fn new(token: Map<String, Value>) -> Self {
        Self::with_timestamp(token, SystemTime::now())
    }

    pub fn with_timestamp(token: Map<String, Value>, obtained_at: SystemTime) -> Self {
        Self { token, obtained_at }
    }

    pub fn token(&self) -> &Map<String, Value> {
        &self.token
    }

    pub fn obtained_at(&self) -> SystemTime {
        self.obtained_at
    }

    /// Serialized form written to the settings file: the token object as
    /// compact JSON and nothing else.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &format_args!("<{} redacted fields>", self.token.len()))
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}
