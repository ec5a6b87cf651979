//! Persisted credential blob — spec §6 "Persisted state" and §4.1
//! "Credential persistence".
//!
//! A single JSON file `{session, ts}` in a per-user config directory.
//! Session index 0 authenticates once and persists the result here;
//! siblings load it and skip the authentication exchange entirely.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;

/// The persisted credential: an opaque session token plus the timestamp it
/// was minted, serialized verbatim as `{session, ts}` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBlob {
    pub session: String,
    pub ts: u128,
}

impl CredentialBlob {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            ts: now_millis(),
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Default on-disk location: `<config_dir>/streamd/credential.json`.
pub fn default_credential_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
    base.join("streamd").join("credential.json")
}

/// Load a previously persisted credential, if any. Corrupt or unreadable
/// files are treated as absent — the caller re-authenticates.
pub fn load(path: &Path) -> Option<CredentialBlob> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Persist a credential blob atomically: write to a sibling temp file, then
/// rename over the target. Creates the parent directory (user-private) if
/// absent.
pub fn persist(path: &Path, blob: &CredentialBlob) -> Result<(), TransportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransportError::Io(e.to_string()))?;
        #[cfg(unix)]
        {
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }

    let content = serde_json::to_string(blob).map_err(|e| TransportError::Io(e.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &content).map_err(|e| TransportError::Io(e.to_string()))?;
    #[cfg(unix)]
    {
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp_path, path).map_err(|e| TransportError::Io(e.to_string()))?;

    debug!(?path, "persisted credential blob");
    Ok(())
}
