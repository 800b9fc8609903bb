//! Token bootstrap: refresh the stored token when stale, report on it, or
//! clear it.

use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use super::authenticate;
use crate::config::Config;
use crate::store;

/// What `refresh` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Stored token was fresh; nothing was fetched
    Fresh,
    /// A new token was obtained and written
    Refreshed,
}

/// Make sure a fresh token is stored, signing in if it is missing, stale,
/// or `force` is set.
///
/// A single attempt is made. Failures propagate; a consent wall or provider
/// rejection will not go away by running again.
pub async fn refresh(config: &Config, force: bool) -> Result<RefreshOutcome> {
    let path = config.credential_path()?;
    let max_age = config.max_age();

    if !force && !store::is_stale(&path, max_age) {
        tracing::info!(
            "Token at {} is younger than {}s, not refreshing",
            path.display(),
            max_age.as_secs()
        );
        return Ok(RefreshOutcome::Fresh);
    }

    let login = config.login_config()?;
    tracing::info!("Obtaining a new token from {}", login.endpoint);
    let credential = match authenticate(&login).await {
        Ok(credential) => credential,
        Err(e) => {
            if e.is_transient() {
                tracing::warn!("Could not reach {}; safe to retry later", login.endpoint);
            }
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to obtain a token from {}", login.endpoint)));
        }
    };

    store::persist(&path, &credential, &config.ownership())
        .with_context(|| format!("Failed to write token to {}", path.display()))?;
    Ok(RefreshOutcome::Refreshed)
}

/// Remove the stored token
pub fn clear(config: &Config) -> Result<()> {
    let path = config.credential_path()?;
    if store::remove(&path)? {
        println!("Removed {}.", path.display());
    } else {
        println!("No token stored at {}.", path.display());
    }
    Ok(())
}

/// Display the stored token's state. Values are never printed.
pub fn status(config: &Config) -> Result<()> {
    let path = config.credential_path()?;
    let max_age = config.max_age();
    println!("Token file:  {}", path.display());

    let credential = match store::load(&path)? {
        Some(credential) => credential,
        None => {
            println!("Token:       none");
            println!("\nRun 'acd-token refresh' to sign in.");
            return Ok(());
        }
    };

    let obtained: DateTime<Local> = credential.obtained_at().into();
    let age = store::file_age_at(&path, SystemTime::now())?.unwrap_or_default();
    let state = if store::is_stale(&path, max_age) {
        "stale"
    } else {
        "fresh"
    };
    println!("Token:       {}", state);
    println!("  written:   {}", obtained.format("%Y-%m-%d %H:%M:%S"));
    println!("  age:       {}s (max {}s)", age.as_secs(), max_age.as_secs());

    let mut fields: Vec<&str> = credential.token().keys().map(String::as_str).collect();
    fields.sort_unstable();
    println!("  fields:    {}", fields.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            settings_dir: Some(dir.path().join("acd_cli")),
            // unreachable: any network use fails the test
            endpoint: Some("http://127.0.0.1:1/".to_string()),
            email: Some("me@example.test".to_string()),
            password: Some("secret".to_string()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_skips_fresh_token() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let path = config.credential_path().unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"{"access_token":"cached"}"#).unwrap();

        let outcome = refresh(&config, false).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Fresh);
        assert_eq!(fs::read(&path).unwrap(), br#"{"access_token":"cached"}"#);
    }

    #[tokio::test]
    async fn test_forced_refresh_failure_keeps_old_token() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let path = config.credential_path().unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, br#"{"access_token":"cached"}"#).unwrap();

        let err = refresh(&config, true).await.unwrap_err();
        assert!(err.to_string().contains("Failed to obtain a token"));
        let cause = err.downcast_ref::<crate::auth::AuthError>().unwrap();
        assert!(cause.is_transient());
        assert_eq!(fs::read(&path).unwrap(), br#"{"access_token":"cached"}"#);
    }

    #[tokio::test]
    async fn test_refresh_requires_account() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            email: None,
            ..config_in(&dir)
        };
        let err = refresh(&config, false).await.unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_status_and_clear() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        status(&config).unwrap();

        let path = config.credential_path().unwrap();
        let token = match json!({"access_token": "abc"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        store::persist(&path, &crate::auth::Credential::new(token), &config.ownership()).unwrap();
        status(&config).unwrap();

        clear(&config).unwrap();
        assert!(!path.exists());
        clear(&config).unwrap();
    }
}
