//! Notarization API key handling.
//!
//! `notarytool` only accepts the private key as a file path. When the key is
//! supplied inline (`APPLE_API_KEY_CONTENT`) it is written to a private
//! temporary `.p8` file that lives exactly as long as the [`ScopedApiKey`].

use crate::error::{ErrorExt, NotarizationError};
use crate::packager::model::{ApiCredentials, PrivateKeySource};
use secrecy::ExposeSecret;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// API key file available to `notarytool` for the lifetime of this value.
///
/// Inline keys are overwritten with zeros and removed on drop, including
/// when the notarization wait fails or is cancelled.
#[derive(Debug)]
pub struct ScopedApiKey {
    path: PathBuf,
    temp: Option<tempfile::NamedTempFile>,
}

impl ScopedApiKey {
    /// Materialize the key from `credentials`.
    pub fn materialize(credentials: &ApiCredentials) -> Result<Self, NotarizationError> {
        match &credentials.key {
            PrivateKeySource::File(path) => {
                if !path.is_file() {
                    return Err(NotarizationError::MissingApiKey { path: path.clone() });
                }
                Ok(Self {
                    path: path.clone(),
                    temp: None,
                })
            }
            PrivateKeySource::Inline(content) => {
                let mut temp = tempfile::Builder::new()
                    .prefix(&format!("AuthKey_{}_", credentials.key_id))
                    .suffix(".p8")
                    .tempfile()
                    .fs_context("creating API key file", std::env::temp_dir())?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    temp.as_file()
                        .set_permissions(std::fs::Permissions::from_mode(0o600))
                        .fs_context("restricting API key file", temp.path())?;
                }

                let path = temp.path().to_path_buf();
                temp.write_all(content.expose_secret().as_bytes())
                    .and_then(|_| temp.flush())
                    .fs_context("writing API key file", &path)?;

                log::debug!("Wrote inline API key to {}", path.display());
                Ok(Self {
                    path,
                    temp: Some(temp),
                })
            }
        }
    }

    /// Path to pass as `notarytool --key`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the key file is owned (and will be removed) by this value.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

impl Drop for ScopedApiKey {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.as_mut() {
            let file = temp.as_file_mut();
            if let Ok(meta) = file.metadata() {
                let zeros = vec![0u8; meta.len() as usize];
                let _ = file
                    .seek(SeekFrom::Start(0))
                    .and_then(|_| file.write_all(&zeros))
                    .and_then(|_| file.sync_all());
            }
            log::debug!("Removing API key file {}", self.path.display());
        }
        // NamedTempFile unlinks itself when dropped right after this
    }
}
