// tests/engine_test.rs

//! End-to-end tests over on-disk databases: a local database loaded from
//! a tree of desc entries, a sync database refreshed from a tarball, and
//! transactions committed against both.

use flate2::write::GzEncoder;
use flate2::Compression;
use pacrat::callback::NullSink;
use pacrat::config::{Config, Repository};
use pacrat::dep;
use pacrat::handle::Handle;
use pacrat::transaction::{TransactionFlags, TransactionState};
use std::fs;
use std::path::Path;

/// Write one installed-package desc entry under `local_dir`.
fn write_local_entry(local_dir: &Path, name: &str, version: &str, extra: &str) {
    let entry = local_dir.join(format!("{name}-{version}"));
    fs::create_dir_all(&entry).unwrap();
    let desc = format!("%NAME%\n{name}\n\n%VERSION%\n{version}\n\n{extra}");
    fs::write(entry.join("desc"), desc).unwrap();
}

/// Build a gzip'd sync database tarball holding `<name>-<version>/desc`
/// entries.
fn write_sync_db(path: &Path, entries: &[(&str, &str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, version, extra) in entries {
        let desc = format!("%NAME%\n{name}\n\n%VERSION%\n{version}\n\n{extra}");
        let mut header = tar::Header::new_gnu();
        header
            .set_path(format!("{name}-{version}/desc"))
            .unwrap();
        header.set_size(desc.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, desc.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn test_config(root: &Path) -> Config {
    Config {
        dbpath: root.join("db"),
        logfile: root.join("pacrat.log"),
        sync_repositories: vec![Repository {
            name: "core".into(),
            priority: 0,
            servers: vec!["https://mirror.example/core".into()],
        }],
        ..Config::default()
    }
}

#[test]
fn test_handle_loads_local_database_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let local_dir = dir.path().join("db/local");
    write_local_entry(&local_dir, "glibc", "2.38-1", "%DESC%\nGNU C library\n\n");
    write_local_entry(&local_dir, "zlib", "1.3-1", "%PROVIDES%\nlibz=1.3\n\n");

    let handle = Handle::new(test_config(dir.path())).unwrap();
    let local = handle.localdb();
    assert_eq!(local.pkgcache().len(), 2);

    let glibc = local.pkg("glibc").unwrap();
    assert_eq!(glibc.version, "2.38-1");
    assert_eq!(glibc.desc.as_deref(), Some("GNU C library"));
    assert!(glibc.db().unwrap().is_local());

    // provides entries satisfy versioned lookups
    let satisfier = dep::find_satisfier(&local.pkgcache(), "libz>=1.2").unwrap();
    assert_eq!(satisfier.unwrap().name, "zlib");

    // the configured repository is registered with its servers
    let core = handle.syncdb("core").unwrap();
    assert_eq!(core.servers(), vec!["https://mirror.example/core"]);
    assert!(core.pkgcache().is_empty());
}

#[test]
fn test_sync_refresh_reads_tarball_and_caches_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("core.db");
    write_sync_db(
        &archive,
        &[
            ("curl", "8.0-1", "%DEPENDS%\nzlib\n\n"),
            ("zlib", "1.3-1", ""),
        ],
    );

    let mut handle = Handle::new(test_config(dir.path())).unwrap();
    let core = handle.register_syncdb("staging", 5);
    assert!(core.refresh(&archive, false).unwrap());
    assert_eq!(core.pkgcache().len(), 2);
    assert_eq!(core.pkg("curl").unwrap().depends[0].name, "zlib");

    // unchanged archive: refresh is a no-op unless forced
    assert!(!core.refresh(&archive, false).unwrap());
    assert!(core.refresh(&archive, true).unwrap());
}

#[test]
fn test_install_from_sync_pulls_dependencies_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("core.db");
    write_sync_db(
        &archive,
        &[
            ("app", "1.0-1", "%DEPENDS%\nlibfoo>=2\n\n"),
            ("libfoo", "2.1-1", ""),
        ],
    );

    let mut handle = Handle::new(test_config(dir.path())).unwrap();
    handle
        .syncdb("core")
        .unwrap()
        .refresh(&archive, false)
        .unwrap();

    let target = handle.syncdb("core").unwrap().pkg("app").unwrap();
    let mut sink = NullSink;
    let mut trans = handle.transaction(TransactionFlags::default(), &mut sink);
    trans.add_pkg(target).unwrap();
    trans.prepare().unwrap();
    assert_eq!(trans.to_add().len(), 2);
    trans.commit().unwrap();
    assert_eq!(trans.state(), TransactionState::Committed);
    trans.release();

    assert!(dir.path().join("db/local/app-1.0-1/desc").is_file());
    assert!(dir.path().join("db/local/libfoo-2.1-1/desc").is_file());

    // a fresh context sees the committed state, reasons included
    let reloaded = Handle::new(test_config(dir.path())).unwrap();
    let app = reloaded.localdb().pkg("app").unwrap();
    let libfoo = reloaded.localdb().pkg("libfoo").unwrap();
    assert_eq!(app.version, "1.0-1");
    assert_eq!(app.reason, pacrat::package::InstallReason::Explicit);
    assert_eq!(libfoo.reason, pacrat::package::InstallReason::Dependency);
    assert!(app.installdate > 0);
}

#[test]
fn test_cascade_removal_persists() {
    let dir = tempfile::tempdir().unwrap();
    let local_dir = dir.path().join("db/local");
    write_local_entry(&local_dir, "lib", "1-1", "");
    write_local_entry(&local_dir, "app", "1-1", "%DEPENDS%\nlib\n\n");

    let mut handle = Handle::new(test_config(dir.path())).unwrap();
    let lib = handle.localdb().pkg("lib").unwrap();
    let mut sink = NullSink;
    let flags = TransactionFlags {
        cascade: true,
        ..TransactionFlags::default()
    };
    let mut trans = handle.transaction(flags, &mut sink);
    trans.remove_pkg(lib).unwrap();
    trans.prepare().unwrap();
    trans.commit().unwrap();
    trans.release();

    assert!(!local_dir.join("lib-1-1").exists());
    assert!(!local_dir.join("app-1-1").exists());

    let reloaded = Handle::new(test_config(dir.path())).unwrap();
    assert!(reloaded.localdb().pkgcache().is_empty());
}

#[test]
fn test_record_survives_dropped_context() {
    let dir = tempfile::tempdir().unwrap();
    let local_dir = dir.path().join("db/local");
    write_local_entry(&local_dir, "keepme", "3.2-1", "%DESC%\nstays valid\n\n");

    let snapshot = {
        let handle = Handle::new(test_config(dir.path())).unwrap();
        handle.localdb().pkg("keepme").unwrap()
    };

    // all data fields stay readable; the owner link reports detachment
    assert_eq!(snapshot.fullname(), "keepme-3.2-1");
    assert_eq!(snapshot.desc.as_deref(), Some("stays valid"));
    assert!(snapshot.db().is_none());
}

#[test]
fn test_sysupgrade_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let local_dir = dir.path().join("db/local");
    write_local_entry(&local_dir, "curl", "7.88-1", "");
    let archive = dir.path().join("core.db");
    write_sync_db(&archive, &[("curl", "8.0-1", "")]);

    let mut handle = Handle::new(test_config(dir.path())).unwrap();
    handle
        .syncdb("core")
        .unwrap()
        .refresh(&archive, false)
        .unwrap();

    let mut sink = NullSink;
    let mut trans = handle.transaction(TransactionFlags::default(), &mut sink);
    trans.sysupgrade(false).unwrap();
    trans.prepare().unwrap();
    trans.commit().unwrap();
    trans.release();

    assert!(!local_dir.join("curl-7.88-1").exists());
    assert!(dir.path().join("db/local/curl-8.0-1/desc").is_file());
    assert_eq!(handle.localdb().pkg("curl").unwrap().version, "8.0-1");
}
