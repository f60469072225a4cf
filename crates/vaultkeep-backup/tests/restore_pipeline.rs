//! Restore pipeline: confirmation, point of no return and cleanup

mod common;

use common::*;
use std::fs;
use std::time::Duration;
use vaultkeep_backup::{ArchiveError, Engine, Error, RestoreRequest, Stage, TimeLimitedCodec};

/// Engine plus handles on its doubles, with one backup already taken
async fn backed_up(env: &TestEnv, codec: ScriptedCodec, encryptor: FakeEncryptor) -> (Engine, FakeController, CallLog) {
    let controller = FakeController::new();
    let log = controller.log.clone();
    let engine = engine(env.settings(), controller.clone(), codec, encryptor);
    engine.run_backup_at(at(2024, 1, 10, 2)).await.unwrap();
    (engine, controller, log)
}

#[tokio::test]
async fn test_round_trip_restores_data() {
    let env = TestEnv::new();
    let (engine, controller, log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    fs::write(env.data_dir.join("db.sqlite3"), "corrupted").unwrap();
    fs::write(env.data_dir.join("stray.tmp"), "stray").unwrap();
    fs::remove_dir_all(env.data_dir.join("attachments")).unwrap();

    let confirmer = ScriptedConfirmer::yes();
    let report = engine
        .run_restore(&RestoreRequest::latest(), &confirmer)
        .await
        .unwrap();

    assert_eq!(report.artifact.id.to_string(), "20240110T020000");
    assert_eq!(report.target_dir, env.data_dir);
    assert!(report.ownership.is_none());
    assert_eq!(log.calls(), vec!["stop", "start", "stop", "start"]);
    assert!(controller.is_up());
    assert_eq!(confirmer.times_asked(), 1);

    assert_eq!(
        fs::read_to_string(env.data_dir.join("db.sqlite3")).unwrap(),
        "sqlite database"
    );
    assert_eq!(
        fs::read(env.data_dir.join("attachments/abc/file.bin")).unwrap(),
        vec![7u8; 4096]
    );
    assert!(!env.data_dir.join("stray.tmp").exists());
    assert_eq!(env.staging_leftovers(), 0);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(env.data_dir.join("hook.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        let link = fs::read_link(env.data_dir.join("db-link")).unwrap();
        assert_eq!(link.to_str(), Some("db.sqlite3"));
    }
}

#[tokio::test]
async fn test_confirmation_shows_summary() {
    let env = TestEnv::new();
    let (engine, _controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let confirmer = ScriptedConfirmer::yes();
    engine
        .run_restore(&RestoreRequest::new("20240110T020000"), &confirmer)
        .await
        .unwrap();

    let shown = confirmer.shown.lock().unwrap();
    assert_eq!(shown[0].backup_id, "20240110T020000");
    assert_eq!(shown[0].target_dir, env.data_dir);
    assert_eq!(shown[0].container, CONTAINER);
    assert!(shown[0].size_bytes > 0);
}

#[tokio::test]
async fn test_declined_restore_changes_nothing() {
    let env = TestEnv::new();
    let (engine, controller, log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;
    fs::write(env.data_dir.join("db.sqlite3"), "newer data").unwrap();

    let confirmer = ScriptedConfirmer::no();
    let err = engine
        .run_restore(&RestoreRequest::latest(), &confirmer)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConfirmationDeclined));
    assert_eq!(log.calls(), vec!["stop", "start"]);
    assert!(controller.is_up());
    assert_eq!(
        fs::read_to_string(env.data_dir.join("db.sqlite3")).unwrap(),
        "newer data"
    );
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_skip_confirmation_never_asks() {
    let env = TestEnv::new();
    let (engine, _controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let confirmer = ScriptedConfirmer::no();
    engine
        .run_restore(
            &RestoreRequest::latest().with_skip_confirmation(true),
            &confirmer,
        )
        .await
        .unwrap();
    assert_eq!(confirmer.times_asked(), 0);
}

#[tokio::test]
async fn test_unknown_backup_id() {
    let env = TestEnv::new();
    let (engine, _controller, log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let err = engine
        .run_restore(&RestoreRequest::new("20230101T000000"), &ScriptedConfirmer::yes())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BackupNotFound { ref id } if id == "20230101T000000"));
    assert_eq!(log.calls(), vec!["stop", "start"]);
}

#[tokio::test]
async fn test_latest_with_empty_catalog() {
    let env = TestEnv::new();
    let engine = engine(env.settings(), FakeController::new(), ScriptedCodec::new(), FakeEncryptor::new());

    let err = engine
        .run_restore(&RestoreRequest::latest(), &ScriptedConfirmer::yes())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackupNotFound { .. }));
}

#[tokio::test]
async fn test_extraction_failure_after_delete_still_restarts_and_cleans_up() {
    let env = TestEnv::new();
    let (engine, controller, log) =
        backed_up(&env, ScriptedCodec::new().failing_extract(), FakeEncryptor::new()).await;

    let err = engine
        .run_restore(&RestoreRequest::latest(), &ScriptedConfirmer::yes())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Archive {
            stage: Stage::Extracting,
            ..
        }
    ));
    assert_eq!(log.calls(), vec!["stop", "start", "stop", "start"]);
    assert!(controller.is_up());
    assert!(!env.data_dir.exists());
    assert_eq!(env.staging_leftovers(), 0);
    assert!(env.extraction_leftovers().is_empty());
}

#[tokio::test]
async fn test_stop_failure_aborts_before_delete() {
    let env = TestEnv::new();
    let (_engine, _controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let controller = FakeController::new().failing_stop();
    let log = controller.log.clone();
    let engine = engine(env.settings(), controller, ScriptedCodec::new(), FakeEncryptor::new());

    let err = engine
        .run_restore(&RestoreRequest::latest(), &ScriptedConfirmer::yes())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Stopping));
    assert_eq!(log.calls(), vec!["stop"]);
    assert!(env.data_dir.join("db.sqlite3").exists());
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_encrypted_restore_decrypts_in_staging() {
    let env = TestEnv::new();
    let mut settings = env.settings();
    settings.encryption_key = Some("ops@example.com".to_string());
    let encryptor = FakeEncryptor::new();
    let enc_log = encryptor.log.clone();
    let engine = engine(settings, FakeController::new(), ScriptedCodec::new(), encryptor);
    engine.run_backup_at(at(2024, 1, 10, 2)).await.unwrap();
    fs::write(env.data_dir.join("db.sqlite3"), "changed").unwrap();

    engine
        .run_restore(&RestoreRequest::latest(), &ScriptedConfirmer::yes())
        .await
        .unwrap();

    assert_eq!(enc_log.calls(), vec!["encrypt ops@example.com", "decrypt"]);
    assert_eq!(
        fs::read_to_string(env.data_dir.join("db.sqlite3")).unwrap(),
        "sqlite database"
    );
    assert_eq!(env.artifact_files(), vec!["20240110T020000.tar.gz.gpg"]);
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_decryption_failure_aborts_before_destructive_steps() {
    let env = TestEnv::new();
    let mut settings = env.settings();
    settings.encryption_key = Some("ops@example.com".to_string());
    let engine = engine(
        settings.clone(),
        FakeController::new(),
        ScriptedCodec::new(),
        FakeEncryptor::new(),
    );
    engine.run_backup_at(at(2024, 1, 10, 2)).await.unwrap();

    let controller = FakeController::new();
    let log = controller.log.clone();
    let confirmer = ScriptedConfirmer::yes();
    let engine = common::engine(
        settings,
        controller,
        ScriptedCodec::new(),
        FakeEncryptor::new().failing_decrypt(),
    );
    let err = engine
        .run_restore(&RestoreRequest::latest(), &confirmer)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Decrypting));
    assert!(log.calls().is_empty());
    assert_eq!(confirmer.times_asked(), 0);
    assert!(env.data_dir.join("db.sqlite3").exists());
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_restore_into_other_target() {
    let env = TestEnv::new();
    let (engine, _controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let alt_parent = env.root.join("alt");
    fs::create_dir_all(&alt_parent).unwrap();
    let request = RestoreRequest::latest()
        .with_target_dir(alt_parent.join("data"))
        .with_skip_confirmation(true);
    let report = engine.run_restore(&request, &ScriptedConfirmer::no()).await.unwrap();

    assert_eq!(report.target_dir, alt_parent.join("data"));
    assert!(alt_parent.join("data/db.sqlite3").exists());
    assert!(env.data_dir.join("db.sqlite3").exists());
}

#[tokio::test]
async fn test_restore_into_renamed_target_leaves_live_data_alone() {
    let env = TestEnv::new();
    let (engine, controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;
    fs::write(env.data_dir.join("db.sqlite3"), "live newer data").unwrap();

    let target = env.root.join("app/data-restore");
    let request = RestoreRequest::latest()
        .with_target_dir(target.clone())
        .with_skip_confirmation(true);
    let report = engine.run_restore(&request, &ScriptedConfirmer::no()).await.unwrap();

    assert_eq!(report.target_dir, target);
    assert_eq!(
        fs::read_to_string(target.join("db.sqlite3")).unwrap(),
        "sqlite database"
    );
    assert!(target.join("attachments/abc/file.bin").exists());
    assert_eq!(
        fs::read_to_string(env.data_dir.join("db.sqlite3")).unwrap(),
        "live newer data"
    );
    assert!(controller.is_up());
    assert!(env.extraction_leftovers().is_empty());
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_archive_without_single_directory_rejected() {
    let env = TestEnv::new();
    let (engine, controller, _log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    // A tarball of two loose files instead of one directory
    let loose = env.root.join("loose");
    fs::create_dir_all(&loose).unwrap();
    fs::write(loose.join("a.txt"), "a").unwrap();
    fs::write(loose.join("b.txt"), "b").unwrap();
    let file = fs::File::create(env.destination.join("20240111T020000.tar.gz")).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_path_with_name(loose.join("a.txt"), "a.txt").unwrap();
    builder.append_path_with_name(loose.join("b.txt"), "b.txt").unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let err = engine
        .run_restore(
            &RestoreRequest::latest().with_skip_confirmation(true),
            &ScriptedConfirmer::no(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Archive {
            stage: Stage::Extracting,
            source: ArchiveError::CorruptArchive { .. },
        }
    ));
    assert!(controller.is_up());
    assert!(!env.root.join("app/a.txt").exists());
    assert!(env.extraction_leftovers().is_empty());
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_extraction_timeout_restarts_container() {
    let env = TestEnv::new();
    fs::create_dir_all(&env.destination).unwrap();
    fs::write(env.destination.join("20240110T020000.tar.gz"), b"not really gzip").unwrap();

    let controller = FakeController::new();
    let log = controller.log.clone();
    let codec = SlowCodec::new();
    let codec_log = codec.log.clone();
    let engine = engine(
        env.settings(),
        controller.clone(),
        TimeLimitedCodec::new(codec, Duration::from_secs(60)),
        FakeEncryptor::new(),
    );

    let err = engine
        .run_restore(
            &RestoreRequest::latest().with_skip_confirmation(true),
            &ScriptedConfirmer::no(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Archive {
            stage: Stage::Extracting,
            source: ArchiveError::TimedOut { timeout, .. },
        } if timeout == Duration::from_secs(60)
    ));
    assert_eq!(codec_log.calls(), vec!["extract"]);
    assert_eq!(log.calls(), vec!["stop", "start"]);
    assert!(controller.is_up());
    assert!(env.extraction_leftovers().is_empty());
    assert_eq!(env.staging_leftovers(), 0);
}

#[tokio::test]
async fn test_missing_target_parent_rejected_up_front() {
    let env = TestEnv::new();
    let (engine, _controller, log) = backed_up(&env, ScriptedCodec::new(), FakeEncryptor::new()).await;

    let request = RestoreRequest::latest()
        .with_target_dir(env.root.join("nowhere/data"))
        .with_skip_confirmation(true);
    let err = engine
        .run_restore(&request, &ScriptedConfirmer::yes())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Io {
            stage: Stage::Locating,
            ..
        }
    ));
    assert_eq!(log.calls(), vec!["stop", "start"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_ownership_fix_up() {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let env = TestEnv::new();
    let meta = fs::metadata(&env.data_dir).unwrap();
    let mut settings = env.settings();
    settings.ownership = Some((meta.uid(), meta.gid()));
    let engine = engine(settings, FakeController::new(), ScriptedCodec::new(), FakeEncryptor::new());
    engine.run_backup_at(at(2024, 1, 10, 2)).await.unwrap();

    let report = engine
        .run_restore(
            &RestoreRequest::latest().with_skip_confirmation(true),
            &ScriptedConfirmer::no(),
        )
        .await
        .unwrap();

    let ownership = report.ownership.unwrap();
    assert_eq!(ownership.failures, 0);
    assert!(ownership.updated > 0);
    let mode = |p: &str| {
        fs::metadata(env.data_dir.join(p))
            .unwrap()
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode("hook.sh"), 0o600);
    assert_eq!(mode("attachments"), 0o700);
}
