//! Configuration: where the token goes, who owns it, and how to log in

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{LoginConfig, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::store::{FileOwnership, CREDENTIAL_FILE, DEFAULT_MAX_AGE};

/// acd_cli's settings directory name under the cache directory
const ACD_CLI_DIR: &str = "acd_cli";

/// Application configuration.
///
/// Every field is optional; unset fields fall back to defaults when the
/// effective values are derived.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// OAuth endpoint serving the sign-in form
    pub endpoint: Option<String>,
    /// Account email
    pub email: Option<String>,
    /// Account password
    pub password: Option<String>,
    /// acd_cli settings directory holding `oauth_data`
    pub settings_dir: Option<PathBuf>,
    /// Owner of the settings directory and token file
    pub user: Option<String>,
    /// Group of the settings directory and token file
    pub group: Option<String>,
    /// Refresh the stored token once it is older than this
    pub max_age_secs: Option<u64>,
    /// Browser identity presented to the provider
    pub user_agent: Option<String>,
    /// Per-request timeout
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "acd-token", "acd-token")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay `overrides`: every field set there wins.
    pub fn merge(self, overrides: Config) -> Self {
        Self {
            endpoint: overrides.endpoint.or(self.endpoint),
            email: overrides.email.or(self.email),
            password: overrides.password.or(self.password),
            settings_dir: overrides.settings_dir.or(self.settings_dir),
            user: overrides.user.or(self.user),
            group: overrides.group.or(self.group),
            max_age_secs: overrides.max_age_secs.or(self.max_age_secs),
            user_agent: overrides.user_agent.or(self.user_agent),
            request_timeout_secs: overrides.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_AGE)
    }

    /// Login parameters; fails if the account is not configured.
    pub fn login_config(&self) -> Result<LoginConfig> {
        let email = self
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .context("No account email configured (set `email` or pass --email)")?;
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .context("No account password configured (set `password` or ACD_TOKEN_PASSWORD)")?;

        let mut login = LoginConfig::new(self.endpoint(), email, password);
        login.user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        login.timeout = Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        Ok(login)
    }

    /// acd_cli settings directory.
    ///
    /// Defaults to `~<user>/.cache/acd_cli` for the configured owner, or the
    /// current user's cache directory.
    pub fn settings_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.settings_dir {
            return Ok(dir.clone());
        }
        if let Some(ref user) = self.user {
            return Ok(home_of(user)?.join(".cache").join(ACD_CLI_DIR));
        }
        let base = BaseDirs::new().context("Could not determine cache directory")?;
        Ok(base.cache_dir().join(ACD_CLI_DIR))
    }

    /// Path of the `oauth_data` token file
    pub fn credential_path(&self) -> Result<PathBuf> {
        Ok(self.settings_dir()?.join(CREDENTIAL_FILE))
    }

    pub fn ownership(&self) -> FileOwnership {
        FileOwnership {
            user: self.user.clone(),
            group: self.group.clone(),
            ..FileOwnership::default()
        }
    }
}

#[cfg(unix)]
fn home_of(user: &str) -> Result<PathBuf> {
    let entry = nix::unistd::User::from_name(user)
        .with_context(|| format!("Failed to look up user '{}'", user))?
        .with_context(|| format!("Unknown user '{}'", user))?;
    Ok(entry.dir)
}

#[cfg(not(unix))]
fn home_of(user: &str) -> Result<PathBuf> {
    anyhow::bail!("Cannot resolve the home directory of '{}' on this platform; set settings_dir", user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
                endpoint = "https://auth.example.test/"
                email = "me@example.test"
                password = "hunter2"
                settings_dir = "/srv/acd/.cache/acd_cli"
                user = "acd"
                group = "media"
                max_age_secs = 1800
                user_agent = "Mozilla/5.0 (X11; Linux x86_64)"
                request_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint(), "https://auth.example.test/");
        assert_eq!(config.max_age(), Duration::from_secs(1800));
        assert_eq!(
            config.credential_path().unwrap(),
            PathBuf::from("/srv/acd/.cache/acd_cli/oauth_data")
        );
        let ownership = config.ownership();
        assert_eq!(ownership.user.as_deref(), Some("acd"));
        assert_eq!(ownership.group.as_deref(), Some("media"));
        assert_eq!(ownership.mode, 0o640);

        let login = config.login_config().unwrap();
        assert_eq!(login.email, "me@example.test");
        assert_eq!(login.user_agent, "Mozilla/5.0 (X11; Linux x86_64)");
        assert_eq!(login.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.max_age(), Duration::from_secs(3600));
        assert!(config.login_config().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("pasword = \"typo\"").is_err());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = Config {
            email: Some("file@example.test".to_string()),
            password: Some("from-file".to_string()),
            max_age_secs: Some(60),
            ..Config::default()
        };
        let cli = Config {
            email: Some("cli@example.test".to_string()),
            ..Config::default()
        };

        let merged = file.merge(cli);
        assert_eq!(merged.email.as_deref(), Some("cli@example.test"));
        assert_eq!(merged.password.as_deref(), Some("from-file"));
        assert_eq!(merged.max_age_secs, Some(60));
    }

    #[test]
    fn test_empty_password_is_missing() {
        let config = Config {
            email: Some("me@example.test".to_string()),
            password: Some(String::new()),
            ..Config::default()
        };
        let err = config.login_config().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config == Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "email = \"me@example.test\"\nmax_age_secs = 7200\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.email.as_deref(), Some("me@example.test"));
        assert_eq!(config.max_age(), Duration::from_secs(7200));
    }

    #[cfg(unix)]
    #[test]
    fn test_settings_dir_follows_owner_home() {
        let config = Config {
            user: Some("root".to_string()),
            ..Config::default()
        };
        let home = nix::unistd::User::from_name("root").unwrap().unwrap().dir;
        assert_eq!(
            config.settings_dir().unwrap(),
            home.join(".cache").join("acd_cli")
        );
    }
}
