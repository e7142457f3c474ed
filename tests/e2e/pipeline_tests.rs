//! Full pipeline runs covering update, first install and halting failures.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{
    bundle_archive, zip_archive, zip_archive_with_symlinks, FakeFetcher, FakeLocator,
    TestHarness, BUNDLE, CONFIG_JSON, PENDING_JSON,
};
use std::path::PathBuf;
use waypoint_updater::upgrade::StepStatus;
use waypoint_updater::{Error, InstallMode, UpdateOutcome, UpdaterConfig};

fn applied(outcome: UpdateOutcome) -> waypoint_updater::UpdateReport {
    match outcome {
        UpdateOutcome::Applied(report) => report,
        UpdateOutcome::UpToDate { version } => {
            unreachable!("expected an applied update, got up-to-date {version}")
        }
    }
}

/// Old config survives, new bundle's default config is superseded.
#[test]
fn test_update_keeps_user_config() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[
        (CONFIG_JSON, r#"{"k":1}"#),
        ("Contents/Resources/VERSION", "1.0.0"),
    ]);

    let archive = bundle_archive(&[
        (CONFIG_JSON, "{}"),
        ("Contents/Resources/VERSION", "1.1.0"),
    ]);
    let updater = harness.updater(FakeLocator::found("v1.1.0"), FakeFetcher::serving(archive));

    let report = applied(updater.run().unwrap());

    assert_eq!(report.mode, InstallMode::Update);
    assert_eq!(report.release_tag, "v1.1.0");
    assert_eq!(report.restored, vec![PathBuf::from(CONFIG_JSON)]);
    assert_eq!(harness.read(CONFIG_JSON).unwrap(), r#"{"k":1}"#);
    assert_eq!(harness.read("Contents/Resources/VERSION").unwrap(), "1.1.0");
}

/// A preserved file absent before the update is not fabricated.
#[test]
fn test_absent_preserved_file_stays_absent() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "{}")]);

    let archive = bundle_archive(&[("Contents/Info.plist", "<plist/>")]);
    let updater = harness.updater(FakeLocator::found("v2.0.0"), FakeFetcher::serving(archive));

    let report = applied(updater.run().unwrap());

    assert_eq!(report.skipped, vec![PathBuf::from(PENDING_JSON)]);
    assert!(harness.read(PENDING_JSON).is_none());
}

/// A preserved file absent before keeps whatever the archive shipped.
#[test]
fn test_absent_preserved_file_keeps_shipped_default() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[("Contents/Info.plist", "<old/>")]);

    let archive = bundle_archive(&[(PENDING_JSON, "{\"default\":[]}")]);
    let updater = harness.updater(FakeLocator::found("v2.0.0"), FakeFetcher::serving(archive));

    applied(updater.run().unwrap());
    assert_eq!(harness.read(PENDING_JSON).unwrap(), "{\"default\":[]}");
}

/// Everything outside the preserved set mirrors the archive exactly.
#[test]
fn test_non_preserved_paths_mirror_archive() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[
        (CONFIG_JSON, "user-config"),
        (PENDING_JSON, "user-queue"),
        ("Contents/MacOS/app", "old-binary"),
        ("Contents/Resources/removed.txt", "gone in new release"),
    ]);

    let archive = bundle_archive(&[
        (CONFIG_JSON, "default-config"),
        ("Contents/MacOS/app", "new-binary"),
        ("Contents/Resources/added.txt", "new file"),
    ]);
    let updater = harness.updater(FakeLocator::found("v3.0.0"), FakeFetcher::serving(archive));
    applied(updater.run().unwrap());

    let snapshot = harness.snapshot();
    let expected: Vec<(PathBuf, &[u8])> = vec![
        (PathBuf::from("Contents/MacOS/app"), &b"new-binary"[..]),
        (PathBuf::from("Contents/Resources/added.txt"), &b"new file"[..]),
        (PathBuf::from(CONFIG_JSON), &b"user-config"[..]),
        (PathBuf::from(PENDING_JSON), &b"user-queue"[..]),
    ];
    assert_eq!(snapshot.len(), expected.len());
    for (path, content) in expected {
        assert_eq!(snapshot.get(&path).map(Vec::as_slice), Some(content), "{path:?}");
    }
}

/// First install: no backups, bundle in place, login item registered.
#[test]
fn test_first_install_registers_login_item() {
    let harness = TestHarness::new();
    let archive = bundle_archive(&[(CONFIG_JSON, "{}"), ("Contents/MacOS/app", "bin")]);
    let updater = harness.updater(FakeLocator::found("v1.0.0"), FakeFetcher::serving(archive));

    let report = applied(updater.run().unwrap());

    assert_eq!(report.mode, InstallMode::FirstInstall);
    assert!(report.restored.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.finalize.login_item, StepStatus::Done);
    assert_eq!(harness.login_items.calls(), vec![harness.bundle_path()]);
    assert_eq!(harness.cleaner.calls(), vec![harness.bundle_path()]);
    assert_eq!(harness.read(CONFIG_JSON).unwrap(), "{}");
}

/// Updates clear quarantine but never register a login item.
#[test]
fn test_update_does_not_register_login_item() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[("Contents/MacOS/app", "old")]);

    let archive = bundle_archive(&[("Contents/MacOS/app", "new")]);
    let updater = harness.updater(FakeLocator::found("v1.2.0"), FakeFetcher::serving(archive));

    let report = applied(updater.run().unwrap());
    assert_eq!(report.finalize.login_item, StepStatus::Skipped);
    assert!(harness.login_items.calls().is_empty());
    assert_eq!(harness.cleaner.calls().len(), 1);
}

/// Missing release: nothing downloaded, bundle unchanged.
#[test]
fn test_release_not_found_leaves_bundle_untouched() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "cfg"), ("Contents/MacOS/app", "old")]);
    let before = harness.snapshot();

    let fetcher = FakeFetcher::serving(bundle_archive(&[("Contents/MacOS/app", "new")]));
    let requests = fetcher.requests();
    let updater = harness.updater(FakeLocator::missing(), fetcher);

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::ReleaseNotFound(_)));
    assert!(err.is_pre_destructive());
    assert!(requests.borrow().is_empty());
    assert_eq!(harness.snapshot(), before);
}

/// Failed download: bundle unchanged.
#[test]
fn test_download_failure_leaves_bundle_untouched() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "cfg"), ("Contents/MacOS/app", "old")]);
    let before = harness.snapshot();

    let updater = harness.updater(FakeLocator::found("v1.0.1"), FakeFetcher::failing());

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::DownloadFailed(_)));
    assert_eq!(harness.snapshot(), before);
    assert!(harness.cleaner.calls().is_empty());
}

/// Archive without the expected bundle directory halts before the swap.
#[test]
fn test_archive_without_bundle_is_malformed() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "cfg")]);
    let before = harness.snapshot();

    let archive = zip_archive(&[("SomethingElse.app/Contents/MacOS/app", "bin")]);
    let updater = harness.updater(FakeLocator::found("v1.0.1"), FakeFetcher::serving(archive));

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::MalformedArchive(ref msg) if msg.contains(BUNDLE)));
    assert_eq!(harness.snapshot(), before);
}

/// Corrupt archive halts before the swap.
#[test]
fn test_corrupt_archive_is_malformed() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "cfg")]);
    let before = harness.snapshot();

    let updater = harness.updater(
        FakeLocator::found("v1.0.1"),
        FakeFetcher::serving(b"<html>rate limited</html>".to_vec()),
    );

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::MalformedArchive(_)));
    assert_eq!(harness.snapshot(), before);
}

/// An archive linking into the installed bundle cannot write through the
/// link; the run halts with the bundle unchanged.
#[cfg(unix)]
#[test]
fn test_archive_cannot_write_through_symlink_into_bundle() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "user-config")]);
    let before = harness.snapshot();

    let resources = harness.bundle_path().join("Contents/Resources");
    let link = format!("{BUNDLE}/Contents/Resources");
    let through = format!("{BUNDLE}/{CONFIG_JSON}");
    let archive = zip_archive_with_symlinks(
        &[(link.as_str(), resources.to_str().unwrap())],
        &[(through.as_str(), "overwritten")],
    );
    let updater = harness.updater(FakeLocator::found("v1.0.1"), FakeFetcher::serving(archive));

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::MalformedArchive(_)));
    assert_eq!(harness.snapshot(), before);
    assert_eq!(harness.read(CONFIG_JSON).unwrap(), "user-config");
}

/// A preserved file that exists but cannot be backed up halts the run
/// before the old bundle is removed.
#[cfg(unix)]
#[test]
fn test_backup_failure_leaves_bundle_untouched() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(PENDING_JSON, "queue"), ("Contents/MacOS/app", "old")]);
    // Self-referencing link: present, but stat fails with ELOOP.
    std::os::unix::fs::symlink(
        "waypointdb_findmy_config.json",
        harness.bundle_path().join(CONFIG_JSON),
    )
    .unwrap();
    let before = harness.snapshot();

    let archive = bundle_archive(&[("Contents/MacOS/app", "new")]);
    let updater = harness.updater(FakeLocator::found("v1.0.1"), FakeFetcher::serving(archive));

    let err = updater.run().unwrap_err();
    assert!(matches!(err, Error::Backup { ref path, .. } if path == &PathBuf::from(CONFIG_JSON)));
    assert!(err.is_pre_destructive());
    assert_eq!(harness.snapshot(), before);
    assert!(harness.cleaner.calls().is_empty());
}

/// A failed restore still finalizes, keeps the backups in staging and
/// reports an error.
#[test]
fn test_restore_failure_keeps_backups_and_finalizes() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "user-config")]);

    // The new bundle ships a regular file where the preserved file's
    // directory should be.
    let archive = bundle_archive(&[
        ("Contents/Resources", "not a directory"),
        ("Contents/MacOS/app", "new"),
    ]);
    let updater = harness.updater(FakeLocator::found("v1.0.1"), FakeFetcher::serving(archive));

    let err = updater.run().unwrap_err();
    assert!(!err.is_pre_destructive());
    let Error::Restore { failed, backup_dir } = err else {
        unreachable!("expected a restore failure");
    };
    assert_eq!(failed, vec![PathBuf::from(CONFIG_JSON)]);
    assert!(backup_dir.starts_with(harness.staging_path()));
    assert_eq!(
        std::fs::read_to_string(backup_dir.join(CONFIG_JSON)).unwrap(),
        "user-config"
    );

    // The swap happened and the finalizer ran.
    assert_eq!(harness.read("Contents/MacOS/app").unwrap(), "new");
    assert_eq!(harness.cleaner.calls(), vec![harness.bundle_path()]);
    assert!(harness.login_items.calls().is_empty());
}

/// Leftovers from an earlier failed run do not leak into the new bundle.
#[test]
fn test_stale_staging_is_cleared() {
    let harness = TestHarness::new();
    let stale = harness
        .staging_path()
        .join("extract")
        .join(BUNDLE)
        .join("Contents/Resources/stale.txt");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "from a previous run").unwrap();

    let stale_backup = harness.staging_path().join("backup").join(CONFIG_JSON);
    std::fs::create_dir_all(stale_backup.parent().unwrap()).unwrap();
    std::fs::write(&stale_backup, "stale backup").unwrap();

    let archive = bundle_archive(&[("Contents/MacOS/app", "bin")]);
    let updater = harness.updater(FakeLocator::found("v1.0.0"), FakeFetcher::serving(archive));
    applied(updater.run().unwrap());

    assert!(harness.read("Contents/Resources/stale.txt").is_none());
    assert!(harness.read(CONFIG_JSON).is_none());
}

/// Successful runs remove the staging area.
#[test]
fn test_staging_removed_after_success() {
    let harness = TestHarness::new();
    let archive = bundle_archive(&[("Contents/MacOS/app", "bin")]);
    let updater = harness.updater(FakeLocator::found("v1.0.0"), FakeFetcher::serving(archive));

    applied(updater.run().unwrap());
    assert!(!harness.staging_path().exists());
}

/// Running twice in a row keeps the user state both times.
#[test]
fn test_repeated_updates_keep_state() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[(CONFIG_JSON, "cfg"), (PENDING_JSON, "queue")]);

    for tag in ["v1.1.0", "v1.2.0"] {
        let archive = bundle_archive(&[(CONFIG_JSON, "{}"), ("Contents/Resources/VERSION", tag)]);
        let updater = harness.updater(FakeLocator::found(tag), FakeFetcher::serving(archive));
        applied(updater.run().unwrap());
    }

    assert_eq!(harness.read(CONFIG_JSON).unwrap(), "cfg");
    assert_eq!(harness.read(PENDING_JSON).unwrap(), "queue");
    assert_eq!(harness.read("Contents/Resources/VERSION").unwrap(), "v1.2.0");
}

/// `skip_if_current` leaves a matching installation alone.
#[test]
fn test_skip_if_current() {
    let harness = TestHarness::new();
    harness.install_old_bundle(&[("Contents/Resources/VERSION", "1.4.0")]);
    let before = harness.snapshot();

    let fetcher = FakeFetcher::serving(bundle_archive(&[("Contents/MacOS/app", "new")]));
    let requests = fetcher.requests();
    let config = UpdaterConfig {
        skip_if_current: true,
        ..harness.config()
    };
    let updater = harness.updater_with(config, FakeLocator::found("v1.4.0"), fetcher);

    let outcome = updater.run().unwrap();
    assert!(matches!(outcome, UpdateOutcome::UpToDate { .. }));
    assert!(requests.borrow().is_empty());
    assert_eq!(harness.snapshot(), before);
}

/// Preserved files nested in directories the new bundle lacks are restored.
#[test]
fn test_custom_preserved_path_in_missing_directory() {
    let harness = TestHarness::new();
    let nested = "Contents/Resources/state/cache.json";
    harness.install_old_bundle(&[(nested, "cached")]);

    let mut config = harness.config();
    config
        .preserved_files
        .push(waypoint_updater::PreservedPath::new(nested).unwrap());

    let archive = bundle_archive(&[("Contents/MacOS/app", "bin")]);
    let updater = harness.updater_with(
        config,
        FakeLocator::found("v5.0.0"),
        FakeFetcher::serving(archive),
    );

    let report = applied(updater.run().unwrap());
    assert!(report.restored.contains(&PathBuf::from(nested)));
    assert_eq!(harness.read(nested).unwrap(), "cached");
}
