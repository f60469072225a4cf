//! Shared fixtures and recording test doubles for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use vaultkeep_backup::{
    ArchiveCodec, ArchiveError, ArchiveResult, Confirmer, EncryptionError, Encryptor, Engine,
    EngineSettings, RestoreSummary, RetentionPolicy, TarGzCodec,
};
use vaultkeep_providers::{ContainerController, ContainerError, ContainerHandle};

pub const CONTAINER: &str = "vaultwarden";

/// Shared, inspectable record of calls made to a test double
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

/// Container controller that records calls and tracks a running flag
#[derive(Clone)]
pub struct FakeController {
    pub log: CallLog,
    running: Arc<Mutex<bool>>,
    fail_stop: bool,
    fail_start: bool,
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            running: Arc::new(Mutex::new(true)),
            fail_stop: false,
            fail_start: false,
        }
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn is_up(&self) -> bool {
        *self.running.lock().unwrap()
    }
}

#[async_trait]
impl ContainerController for FakeController {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        self.log.push("stop");
        if self.fail_stop {
            return Err(ContainerError::command_failed(&handle.name, "stop", "stop refused"));
        }
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        self.log.push("start");
        if self.fail_start {
            return Err(ContainerError::command_failed(&handle.name, "start", "start refused"));
        }
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn is_running(&self, _handle: &ContainerHandle) -> Result<bool, ContainerError> {
        Ok(self.is_up())
    }
}

/// Real tar+gzip codec whose steps can be made to fail
pub struct ScriptedCodec {
    inner: TarGzCodec,
    fail_create: bool,
    fail_extract: bool,
    pub log: CallLog,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self {
            inner: TarGzCodec::new(),
            fail_create: false,
            fail_extract: false,
            log: CallLog::default(),
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }
}

#[async_trait]
impl ArchiveCodec for ScriptedCodec {
    async fn create_archive(
        &self,
        source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError> {
        self.log.push("create");
        if self.fail_create {
            return Err(ArchiveError::DiskFull {
                path: dest_path.to_owned(),
            });
        }
        self.inner.create_archive(source_dir, dest_path).await
    }

    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        self.log.push("extract");
        if self.fail_extract {
            return Err(ArchiveError::corrupt(archive, "unexpected end of file"));
        }
        self.inner.extract_archive(archive, dest_parent).await
    }
}

/// Codec that writes a small file without touching a blocking pool
pub struct StubCodec;

#[async_trait]
impl ArchiveCodec for StubCodec {
    async fn create_archive(
        &self,
        _source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError> {
        fs::write(dest_path, b"stub").map_err(|source| ArchiveError::WriteFailed {
            path: dest_path.to_owned(),
            source,
        })?;
        Ok(ArchiveResult {
            path: dest_path.to_owned(),
            size_bytes: 4,
        })
    }

    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        _dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        Err(ArchiveError::corrupt(archive, "stub archives cannot be extracted"))
    }
}

/// Codec whose calls never finish on their own
pub struct SlowCodec {
    pub log: CallLog,
}

impl SlowCodec {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl ArchiveCodec for SlowCodec {
    async fn create_archive(
        &self,
        _source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError> {
        self.log.push("create");
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        Ok(ArchiveResult {
            path: dest_path.to_owned(),
            size_bytes: 0,
        })
    }

    async fn extract_archive(
        &self,
        _archive: &Utf8Path,
        _dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        self.log.push("extract");
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        Ok(())
    }
}

/// Encryptor that "encrypts" by renaming to `.gpg`, optionally failing
pub struct FakeEncryptor {
    fail_encrypt: bool,
    fail_decrypt: bool,
    pub log: CallLog,
}

impl FakeEncryptor {
    pub fn new() -> Self {
        Self {
            fail_encrypt: false,
            fail_decrypt: false,
            log: CallLog::default(),
        }
    }

    pub fn failing_encrypt(mut self) -> Self {
        self.fail_encrypt = true;
        self
    }

    pub fn failing_decrypt(mut self) -> Self {
        self.fail_decrypt = true;
        self
    }
}

#[async_trait]
impl Encryptor for FakeEncryptor {
    async fn encrypt(&self, path: &Utf8Path, recipient: &str) -> Result<Utf8PathBuf, EncryptionError> {
        self.log.push(format!("encrypt {}", recipient));
        if self.fail_encrypt {
            return Err(EncryptionError::KeyNotFound {
                key: recipient.to_string(),
                message: "No public key".to_string(),
            });
        }
        let encrypted = Utf8PathBuf::from(format!("{}.gpg", path));
        fs::rename(path, &encrypted).map_err(|e| EncryptionError::EncryptionFailed {
            message: e.to_string(),
        })?;
        Ok(encrypted)
    }

    async fn decrypt(&self, path: &Utf8Path) -> Result<Utf8PathBuf, EncryptionError> {
        self.log.push("decrypt");
        if self.fail_decrypt {
            return Err(EncryptionError::DecryptionFailed {
                message: "Bad session key".to_string(),
            });
        }
        let plain = Utf8PathBuf::from(path.as_str().trim_end_matches(".gpg"));
        fs::copy(path, &plain).map_err(|e| EncryptionError::DecryptionFailed {
            message: e.to_string(),
        })?;
        Ok(plain)
    }
}

/// Confirmer with a fixed answer that records what it was shown
pub struct ScriptedConfirmer {
    answer: bool,
    pub shown: Mutex<Vec<RestoreSummary>>,
}

impl ScriptedConfirmer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, summary: &RestoreSummary) -> bool {
        self.shown.lock().unwrap().push(summary.clone());
        self.answer
    }
}

/// Temporary data, destination and staging directories
pub struct TestEnv {
    _root: TempDir,
    pub root: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub temp_dir: Utf8PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let data_dir = root.join("app").join("data");
        fs::create_dir_all(data_dir.join("attachments/abc")).unwrap();
        fs::write(data_dir.join("db.sqlite3"), "sqlite database").unwrap();
        fs::write(data_dir.join("config.json"), "{\"domain\":\"https://vault.example.com\"}").unwrap();
        fs::write(data_dir.join("attachments/abc/file.bin"), vec![7u8; 4096]).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::{symlink, PermissionsExt};
            let hook = data_dir.join("hook.sh");
            fs::write(&hook, "#!/bin/sh\necho hi\n").unwrap();
            fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
            symlink("db.sqlite3", data_dir.join("db-link")).unwrap();
        }

        Self {
            _root: dir,
            data_dir,
            destination: root.join("backups"),
            temp_dir: root.join("tmp"),
            root,
        }
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            container: ContainerHandle::new(CONTAINER),
            data_dir: self.data_dir.clone(),
            destination: self.destination.clone(),
            lock_dir: self.destination.clone(),
            temp_dir: self.temp_dir.clone(),
            skip_start_stop: false,
            encryption_key: None,
            encryption_mandatory: true,
            retention: RetentionPolicy::new(7, 4, 6),
            ownership: None,
            schedule_interval: Duration::from_secs(3600),
        }
    }

    /// Visible files in the destination, sorted
    pub fn artifact_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(&self.destination) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|n| !n.starts_with('.'))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Entries left in the staging parent
    pub fn staging_leftovers(&self) -> usize {
        fs::read_dir(&self.temp_dir).map(|d| d.count()).unwrap_or(0)
    }
}

impl TestEnv {
    /// Scratch extraction directories left next to the data directory
    pub fn extraction_leftovers(&self) -> Vec<String> {
        let parent = self.data_dir.parent().unwrap();
        fs::read_dir(parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".vaultkeep-extract-"))
            .collect()
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

pub fn engine(
    settings: EngineSettings,
    controller: FakeController,
    codec: impl ArchiveCodec + 'static,
    encryptor: FakeEncryptor,
) -> Engine {
    Engine::new(
        settings,
        Box::new(controller),
        Box::new(codec),
        Box::new(encryptor),
    )
}
