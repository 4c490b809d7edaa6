//! Persisted login session: token, user, and business/branch selection.
//!
//! The session is the on-device source for the auth and scoping headers
//! attached to every API request. It is JSON-serialized into the data
//! directory and cleared whenever the server reports the token expired.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The logged-in user as returned by the auth endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
  pub id: String,
  pub name: String,
  pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
  pub token: String,
  pub user: SessionUser,
  /// Selected business, sent as X-Business-Id
  pub business_id: Option<String>,
  /// Selected branch, sent as X-Branch-Id
  pub branch_id: Option<String>,
}

/// Loads and stores the session file on disk.
#[derive(Debug, Clone)]
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  /// Store at the default location under the data directory.
  pub fn open() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(Self::at_path(data_dir.join("boh").join("session.json")))
  }

  /// Store at an explicit path (used by tests).
  pub fn at_path(path: PathBuf) -> Self {
    Self { path }
  }

  /// Load the persisted session, if any.
  ///
  /// A missing or unreadable file is treated as "not logged in" rather than
  /// an error; a corrupt file is discarded the same way.
  pub fn load(&self) -> Option<Session> {
    let contents = std::fs::read_to_string(&self.path).ok()?;
    match serde_json::from_str(&contents) {
      Ok(session) => Some(session),
      Err(e) => {
        tracing::warn!("Discarding unreadable session file: {}", e);
        None
      }
    }
  }

  /// Persist the session, replacing any previous one.
  pub fn save(&self, session: &Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let contents =
      serde_json::to_string_pretty(session).map_err(|e| eyre!("Failed to encode session: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))?;

    Ok(())
  }

  /// Remove the persisted session. Used on logout and on session expiry.
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove session file: {}", e)),
    }
  }
}
