//! Browser-emulated sign-in against the OAuth endpoint

use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

use super::form::{self, FormMethod};
use super::{AuthError, Credential, LoginConfig};

/// Name of the sign-in form on the login page
const SIGN_IN_FORM: &str = "signIn";

/// Name of the form the provider shows when the application has not been
/// authorized for this account yet
const CONSENT_FORM: &str = "consent-form";

/// Maximum HTTP redirects followed per request
const MAX_REDIRECTS: usize = 10;

/// Maximum chained `<meta http-equiv="refresh">` hops per page load
const MAX_META_REFRESH: usize = 5;

/// Obtain a fresh credential by signing in through the provider's web form.
///
/// Opens a new session for this call only. No retries happen here: repeated
/// failed sign-ins get the user agent blocked, so backoff is the caller's
/// decision.
pub async fn authenticate(config: &LoginConfig) -> Result<Credential, AuthError> {
    LoginSession::open(config)?.run().await
}

/// A loaded page after redirects and meta refreshes
struct Page {
    url: Url,
    status: u16,
    body: String,
}

/// One sign-in attempt: cookie jar, browser identity and redirect policy.
///
/// IMPORTANT: the whole sign-in runs as the single sequence in [`run`],
/// which consumes the session. Do not split it into separately callable
/// steps. Driving the same stateful session through independent calls
/// corrupted its navigation state (the provider saw what looked like a
/// "back" navigation), and reusing a session after a failure can itself
/// trigger the provider's anti-automation checks. Every attempt gets a new
/// session with an empty cookie jar.
///
/// [`run`]: LoginSession::run
struct LoginSession<'a> {
    client: Client,
    config: &'a LoginConfig,
    endpoint: Url,
}

impl<'a> LoginSession<'a> {
    fn open(config: &'a LoginConfig) -> Result<Self, AuthError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|source| AuthError::InvalidEndpoint {
            url: config.endpoint.clone(),
            source,
        })?;

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.as_str())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    async fn run(self) -> Result<Credential, AuthError> {
        tracing::info!("Fetching sign-in page from {}", self.endpoint);
        let page = self.load(self.client.get(self.endpoint.clone())).await?;
        if !(200..300).contains(&page.status) {
            return Err(unexpected_page(&page, "sign-in page request failed"));
        }

        let mut sign_in = form::find_form(&page.body, SIGN_IN_FORM, &page.url)
            .map_err(|e| {
                unexpected_page(&page, &format!("signIn form action is not a valid URL ({})", e))
            })?
            .ok_or_else(|| unexpected_page(&page, "sign-in page has no signIn form"))?;

        if !sign_in.set("email", &self.config.email) || !sign_in.set("password", &self.config.password) {
            return Err(unexpected_page(
                &page,
                "signIn form lacks an email or password field",
            ));
        }

        tracing::info!("Submitting sign-in form for {}", self.config.email);
        tracing::debug!("Sign-in form action: {:?} {}", sign_in.method, sign_in.action);
        let request = match sign_in.method {
            FormMethod::Post => self.client.post(sign_in.action).form(&sign_in.fields),
            FormMethod::Get => self.client.get(sign_in.action).query(&sign_in.fields),
        };
        let result = self.load(request).await?;
        tracing::debug!("Sign-in response: HTTP {} from {}", result.status, result.url);

        classify_response(&self.config.endpoint, result.status, &result.body)
    }

    /// Send a request and follow any meta-refresh chain on the response
    async fn load(&self, request: RequestBuilder) -> Result<Page, AuthError> {
        let mut page = read_page(request.send().await?).await?;
        for _ in 0..MAX_META_REFRESH {
            let Some(target) = form::meta_refresh_target(&page.body, &page.url) else {
                break;
            };
            if target == page.url {
                tracing::debug!("Ignoring meta refresh to the current page");
                break;
            }
            tracing::debug!("Following meta refresh to {}", target);
            page = read_page(self.client.get(target).send().await?).await?;
        }
        Ok(page)
    }
}

async fn read_page(response: reqwest::Response) -> Result<Page, AuthError> {
    let url = response.url().clone();
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(Page { url, status, body })
}

fn unexpected_page(page: &Page, detail: &str) -> AuthError {
    tracing::warn!(
        status = page.status,
        url = %page.url,
        "{}; raw response body follows:\n{}",
        detail,
        page.body
    );
    AuthError::unexpected(page.status, detail, &page.body)
}

/// Classify the body returned by the sign-in submission.
///
/// A page carrying the consent form wins over everything else; a JSON
/// object is never searched for forms, since token values may contain
/// markup. A JSON object carrying an `error` field is the provider
/// rejecting the login; any other JSON object is the token.
fn classify_response(endpoint: &str, status: u16, body: &str) -> Result<Credential, AuthError> {
    let parsed = serde_json::from_str::<Value>(body);
    if !matches!(parsed, Ok(Value::Object(_))) && form::has_form(body, CONSENT_FORM) {
        return Err(AuthError::ConsentRequired {
            endpoint: endpoint.to_string(),
        });
    }

    let payload = match parsed {
        Ok(Value::Object(payload)) => payload,
        Ok(_) => {
            tracing::warn!(status, "Sign-in response is JSON but not an object:\n{}", body);
            return Err(AuthError::unexpected(status, "response is not a JSON object", body));
        }
        Err(e) => {
            tracing::warn!(status, "Sign-in response is not JSON:\n{}", body);
            return Err(AuthError::unexpected(
                status,
                format!("response is not JSON ({})", e),
                body,
            ));
        }
    };

    if let Some(error) = payload.get("error") {
        let message = payload
            .get("error_description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match error {
                Value::String(code) => code.clone(),
                other => other.to_string(),
            });
        return Err(AuthError::ProviderError(message));
    }

    tracing::info!("Obtained token ({} fields)", payload.len());
    Ok(Credential::new(payload))
}
