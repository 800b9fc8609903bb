//! On-disk credential store for the acd_cli `oauth_data` file.
//!
//! The store keeps no state between runs: freshness is read from the
//! file's modification time each time it is checked, and writes replace
//! the file atomically (temporary file in the same directory, then rename)
//! so a concurrent reader sees either the old or the new token, never a
//! partial one.
//!
//! Staleness is a separate question from persistence. Callers check
//! [`is_stale`] first; [`persist`] always writes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::Credential;

/// File name acd_cli reads its OAuth token from
pub const CREDENTIAL_FILE: &str = "oauth_data";

/// A stored token older than this is refreshed
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Owner read/write, group read
pub const DEFAULT_FILE_MODE: u32 = 0o640;

/// Owner full, group read/traverse
pub const DEFAULT_DIR_MODE: u32 = 0o750;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("Unknown group '{0}'")]
    UnknownGroup(String),

    #[error("Failed to change ownership of {}: {source}", path.display())]
    Ownership {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize credential: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Stored credential at {} is not a JSON object: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Ownership and permission bits applied on write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwnership {
    /// Owning user name; `None` leaves the writer as owner
    pub user: Option<String>,
    /// Owning group name; `None` leaves the writer's group
    pub group: Option<String>,
    /// Permission bits of the credential file
    pub mode: u32,
    /// Permission bits of the settings directory when it is created
    pub dir_mode: u32,
}

impl Default for FileOwnership {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}

/// Whether the credential at `path` needs refreshing.
///
/// A missing (or unreadable) file is stale. Ages are compared in whole
/// seconds with strict greater-than: exactly `max_age` old is still fresh.
pub fn is_stale(path: &Path, max_age: Duration) -> bool {
    is_stale_at(path, max_age, SystemTime::now())
}

/// [`is_stale`] against an explicit clock
pub fn is_stale_at(path: &Path, max_age: Duration, now: SystemTime) -> bool {
    match file_age_at(path, now) {
        Ok(Some(age)) => age.as_secs() > max_age.as_secs(),
        Ok(None) => {
            tracing::debug!("No credential at {}", path.display());
            true
        }
        Err(e) => {
            tracing::debug!("Cannot stat {}, treating as stale: {}", path.display(), e);
            true
        }
    }
}

/// Age of the file at `path`, or `None` if it does not exist.
///
/// A modification time in the future (clock skew) counts as age zero.
pub fn file_age_at(path: &Path, now: SystemTime) -> io::Result<Option<Duration>> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(now.duration_since(modified).unwrap_or(Duration::ZERO)))
}

/// Write `credential` to `path`, replacing any previous file atomically.
///
/// Creates the parent directory (with `dir_mode` and the configured owner)
/// if it is missing. The token content is never logged.
pub fn persist(path: &Path, credential: &Credential, ownership: &FileOwnership) -> Result<(), StoreError> {
    let owner = owner::resolve(ownership)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    if !dir.exists() {
        tracing::info!("Creating settings directory {}", dir.display());
        create_dir(dir, ownership.dir_mode)?;
        owner::apply(dir, &owner)?;
    }

    let contents = credential.to_bytes().map_err(StoreError::Serialize)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", CREDENTIAL_FILE))
        .tempfile_in(dir)
        .map_err(io_error(dir))?;
    tmp.write_all(&contents).map_err(io_error(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_error(tmp.path()))?;
    set_mode(tmp.path(), ownership.mode)?;
    owner::apply(tmp.path(), &owner)?;

    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    tracing::info!("Wrote credential to {} (mode {:o})", path.display(), ownership.mode);
    Ok(())
}

/// Read a stored credential back, or `None` if there is none.
///
/// The acquisition time is the file's modification time.
pub fn load(path: &Path) -> Result<Option<Credential>, StoreError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };
    let token: Map<String, Value> = serde_json::from_slice(&contents).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(io_error(path))?;
    Ok(Some(Credential::with_timestamp(token, modified)))
}

/// Delete the stored credential. Returns false if there was none.
pub fn remove(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed credential {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}

fn create_dir(dir: &Path, mode: u32) -> Result<(), StoreError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    builder.create(dir).map_err(io_error(dir))?;
    // DirBuilder bits are filtered by the umask
    set_mode(dir, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_error(path))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
mod owner {
    use std::io;
    use std::path::Path;

    use nix::unistd::{chown, Gid, Group, Uid, User};

    use super::{FileOwnership, StoreError};

    #[derive(Debug, Default)]
    pub struct Owner {
        uid: Option<Uid>,
        gid: Option<Gid>,
    }

    pub fn resolve(ownership: &FileOwnership) -> Result<Owner, StoreError> {
        let uid = match &ownership.user {
            Some(name) => Some(
                User::from_name(name)
                    .ok()
                    .flatten()
                    .ok_or_else(|| StoreError::UnknownUser(name.clone()))?
                    .uid,
            ),
            None => None,
        };
        let gid = match &ownership.group {
            Some(name) => Some(
                Group::from_name(name)
                    .ok()
                    .flatten()
                    .ok_or_else(|| StoreError::UnknownGroup(name.clone()))?
                    .gid,
            ),
            None => None,
        };
        Ok(Owner { uid, gid })
    }

    pub fn apply(path: &Path, owner: &Owner) -> Result<(), StoreError> {
        if owner.uid.is_none() && owner.gid.is_none() {
            return Ok(());
        }
        chown(path, owner.uid, owner.gid).map_err(|errno| StoreError::Ownership {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        })
    }
}

#[cfg(not(unix))]
mod owner {
    use std::path::Path;

    use super::{FileOwnership, StoreError};

    #[derive(Debug, Default)]
    pub struct Owner;

    pub fn resolve(ownership: &FileOwnership) -> Result<Owner, StoreError> {
        if ownership.user.is_some() || ownership.group.is_some() {
            tracing::warn!("File ownership is not supported on this platform; ignoring user/group");
        }
        Ok(Owner)
    }

    pub fn apply(_path: &Path, _owner: &Owner) -> Result<(), StoreError> {
        Ok(())
    }
}
