//! Public-key encryption of artifacts via gpg

use crate::catalog::PARTIAL_SUFFIX;
use crate::error::EncryptionError;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use tracing::{debug, info, warn};
use vaultkeep_providers::{CommandOutput, CommandRunner, SystemCommandRunner};

/// Extension appended by encryption
pub const GPG_EXTENSION: &str = ".gpg";

/// Wraps and unwraps artifacts
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `path` for `recipient`, remove the plain file and return the encrypted path
    async fn encrypt(&self, path: &Utf8Path, recipient: &str) -> Result<Utf8PathBuf, EncryptionError>;

    /// Decrypt a `.gpg` file next to itself and return the plain path
    async fn decrypt(&self, path: &Utf8Path) -> Result<Utf8PathBuf, EncryptionError>;
}

/// Encryptor shelling out to `gpg --batch`
pub struct GpgEncryptor<R = SystemCommandRunner> {
    runner: R,
}

impl<R: CommandRunner> GpgEncryptor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn gpg(&self, args: Vec<String>) -> Result<CommandOutput, String> {
        self.runner.run("gpg", &args).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl<R: CommandRunner> Encryptor for GpgEncryptor<R> {
    async fn encrypt(&self, path: &Utf8Path, recipient: &str) -> Result<Utf8PathBuf, EncryptionError> {
        let encrypted = Utf8PathBuf::from(format!("{}{}", path, GPG_EXTENSION));
        let partial = Utf8PathBuf::from(format!("{}{}", encrypted, PARTIAL_SUFFIX));
        info!("Encrypting {} for {}", path, recipient);

        let args = vec![
            "--batch".to_string(),
            "--yes".to_string(),
            "--trust-model".to_string(),
            "always".to_string(),
            "--encrypt".to_string(),
            "--recipient".to_string(),
            recipient.to_string(),
            "--output".to_string(),
            partial.to_string(),
            path.to_string(),
        ];

        let failure = match self.gpg(args).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(output.failure_message()),
            Err(message) => Some(message),
        };
        if let Some(message) = failure {
            remove_if_exists(&partial);
            return Err(if mentions_missing_key(&message) {
                EncryptionError::KeyNotFound {
                    key: recipient.to_string(),
                    message,
                }
            } else {
                EncryptionError::EncryptionFailed { message }
            });
        }

        if let Err(e) = fs::rename(&partial, &encrypted) {
            remove_if_exists(&partial);
            return Err(EncryptionError::EncryptionFailed {
                message: format!("failed to finalize {}: {}", encrypted, e),
            });
        }

        if let Err(e) = fs::remove_file(path) {
            warn!("Encrypted {} but failed to remove plain archive: {}", encrypted, e);
        }
        Ok(encrypted)
    }

    async fn decrypt(&self, path: &Utf8Path) -> Result<Utf8PathBuf, EncryptionError> {
        let plain = match path.as_str().strip_suffix(GPG_EXTENSION) {
            Some(stem) => Utf8PathBuf::from(stem),
            None => {
                return Err(EncryptionError::DecryptionFailed {
                    message: format!("{} does not end with {}", path, GPG_EXTENSION),
                })
            }
        };
        debug!("Decrypting {} to {}", path, plain);

        let args = vec![
            "--batch".to_string(),
            "--yes".to_string(),
            "--output".to_string(),
            plain.to_string(),
            "--decrypt".to_string(),
            path.to_string(),
        ];

        let failure = match self.gpg(args).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(output.failure_message()),
            Err(message) => Some(message),
        };
        match failure {
            None => Ok(plain),
            Some(message) => {
                remove_if_exists(&plain);
                Err(if mentions_missing_key(&message) {
                    EncryptionError::KeyNotFound {
                        key: "secret key".to_string(),
                        message,
                    }
                } else {
                    EncryptionError::DecryptionFailed { message }
                })
            }
        }
    }
}

fn mentions_missing_key(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    ["no public key", "no secret key", "public key not found", "unusable public key"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

fn remove_if_exists(path: &Utf8Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path, e),
    }
}
