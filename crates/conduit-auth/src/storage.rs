use std::path::{Path, PathBuf};

use jiff::Timestamp;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Credential, CredentialError};

/// Credential file shared with the agent CLI
///
/// Layout: `{"claudeAiOauth": {"accessToken", "refreshToken", "expiresAt"}}`
/// with `expiresAt` in unix milliseconds. Fields this gateway does not own
/// are carried through rewrites untouched.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

#[derive(Deserialize, Serialize)]
struct FileLayout {
    #[serde(rename = "claudeAiOauth")]
    oauth: OAuthRecord,
    #[serde(flatten)]
    other: Map<String, Value>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct OAuthRecord {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl CredentialFile {
    /// Credential file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the credential, `None` when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Storage` if the file is unreadable or malformed
    pub async fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error("read", &e)),
        };

        let layout: FileLayout = serde_json::from_str(&raw).map_err(|e| self.storage_error("parse", &e))?;
        let expires_at =
            Timestamp::from_millisecond(layout.oauth.expires_at).map_err(|e| self.storage_error("parse", &e))?;

        Ok(Some(Credential::new(
            layout.oauth.access_token,
            layout.oauth.refresh_token,
            expires_at,
        )))
    }

    /// Atomically replace the stored credential
    ///
    /// Writes a sibling temp file with owner-only permissions and renames it
    /// over the original, so readers never see a partial file.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Storage` if any filesystem step fails
    pub async fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let mut layout = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str::<FileLayout>(&raw).ok(),
            Err(_) => None,
        }
        .unwrap_or_else(|| FileLayout {
            oauth: OAuthRecord {
                access_token: String::new(),
                refresh_token: String::new(),
                expires_at: 0,
                other: Map::new(),
            },
            other: Map::new(),
        });

        layout.oauth.access_token = credential.access_token().expose().to_owned();
        layout.oauth.refresh_token = credential.refresh_token().expose_secret().to_owned();
        layout.oauth.expires_at = credential.expires_at().as_millisecond();

        let body = serde_json::to_vec_pretty(&layout).map_err(|e| self.storage_error("encode", &e))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.storage_error("create directory for", &e))?;
        }

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| self.storage_error("write", &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.storage_error("restrict permissions of", &e))?;
        }

        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.storage_error("replace", &e))
    }

    fn storage_error(&self, action: &str, error: &dyn std::fmt::Display) -> CredentialError {
        CredentialError::Storage(format!("failed to {action} {}: {error}", self.path.display()))
    }
}
