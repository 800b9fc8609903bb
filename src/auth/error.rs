use thiserror::Error;

/// Maximum length for provider response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Outcome of a failed login attempt.
///
/// Only `NetworkError` is worth retrying, and then with backoff: repeated
/// failed sign-ins get the user agent blocked from the requesting address.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(
        "Automatic application consent is not supported.\n\
         Log in to {endpoint} and authorize the application's access to your drive, then run again."
    )]
    ConsentRequired { endpoint: String },

    #[error("Identity provider rejected the login: {0}")]
    ProviderError(String),

    #[error("Invalid credentials or unexpected response from server (HTTP {status}): {detail}\n{}", truncate_body(.body))]
    UnexpectedResponse {
        status: u16,
        detail: String,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid URL '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl AuthError {
    /// Whether a later attempt could succeed without human action.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::NetworkError(_))
    }

    pub(crate) fn unexpected(status: u16, detail: impl Into<String>, body: &str) -> Self {
        AuthError::UnexpectedResponse {
            status,
            detail: detail.into(),
            body: body.to_string(),
        }
    }
}

/// Truncate a response body to avoid dumping whole pages into messages
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}... (truncated, {} total bytes)",
        &body[..end],
        body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_message_names_endpoint() {
        let err = AuthError::ConsentRequired {
            endpoint: "https://auth.example.test/".to_string(),
        };
        assert!(err.to_string().contains("https://auth.example.test/"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_truncate_body_short_is_untouched() {
        assert_eq!(truncate_body("not json"), "not json");
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let out = truncate_body(&body);
        assert!(out.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_unexpected_response_keeps_full_body() {
        let body = "x".repeat(2000);
        let err = AuthError::unexpected(502, "bad gateway", &body);
        match &err {
            AuthError::UnexpectedResponse { body: kept, .. } => assert_eq!(kept.len(), 2000),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.to_string().contains("HTTP 502"));
    }
}
