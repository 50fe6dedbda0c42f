//! Mod portal credentials

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Portal username and token used to authorise archive downloads.
///
/// Read from a Factorio `server-settings.json`; the other keys in that file
/// are ignored.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ServerCredentials {
    /// Load and validate credentials. Both fields must be non-empty.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let credentials: ServerCredentials =
            serde_json::from_str(content).map_err(|e| SyncError::decode(source, e))?;

        if credentials.username.trim().is_empty() || credentials.token.trim().is_empty() {
            return Err(SyncError::Credentials(format!(
                "both 'username' and 'token' must be set in {}",
                source
            )));
        }

        Ok(credentials)
    }
}
