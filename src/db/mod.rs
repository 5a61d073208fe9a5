// src/db/mod.rs

//! Package databases
//!
//! A [`Database`] is an insertion-ordered, name-keyed collection of package
//! records. Two flavors exist with the same query contract: the local
//! database of installed packages (mutated by transaction commits and
//! persisted as one `name-version/desc` directory per package) and sync
//! databases (replaced wholesale by [`Database::refresh`] from a tarball of
//! `name-version/desc` entries).
//!
//! Handles are cheap clones of shared storage. Records handed out of
//! queries are `Rc` snapshots that survive the database being refreshed or
//! dropped; only the record's back-reference to its database dies with it.

pub(crate) mod desc;

use crate::error::{Error, Result};
use crate::package::Package;
use flate2::read::GzDecoder;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::rc::Rc;
use std::time::SystemTime;
use tar::Archive;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DbKind {
    Local,
    Sync { priority: i64 },
}

#[derive(Debug)]
pub(crate) struct DbInner {
    name: String,
    kind: DbKind,
    servers: RefCell<Vec<String>>,
    pkgs: RefCell<Vec<Rc<Package>>>,
    /// Lazily built group index in first-seen order, dropped on mutation
    groups: RefCell<Option<Vec<(String, Vec<Rc<Package>>)>>>,
    /// (length, mtime) of the tarball last applied by `refresh`
    sync_stamp: Cell<Option<(u64, SystemTime)>>,
}

/// Handle to a package database
#[derive(Debug, Clone)]
pub struct Database {
    inner: Rc<DbInner>,
}

impl Database {
    /// The local (installed packages) database, initially empty.
    pub fn local() -> Self {
        Self::with_kind("local", DbKind::Local)
    }

    /// A sync database with the given repository name and priority.
    pub fn sync(name: impl Into<String>, priority: i64) -> Self {
        Self::with_kind(name, DbKind::Sync { priority })
    }

    fn with_kind(name: impl Into<String>, kind: DbKind) -> Self {
        Self {
            inner: Rc::new(DbInner {
                name: name.into(),
                kind,
                servers: RefCell::new(Vec::new()),
                pkgs: RefCell::new(Vec::new()),
                groups: RefCell::new(None),
                sync_stamp: Cell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<DbInner>) -> Self {
        Self { inner }
    }

    /// Database name (`"local"`, `"core"`, `"extra"`, ...)
    pub fn name(&self) -> String {
        self.inner.name.clone()
    }

    pub fn is_local(&self) -> bool {
        self.inner.kind == DbKind::Local
    }

    pub(crate) fn priority(&self) -> i64 {
        match self.inner.kind {
            DbKind::Local => 0,
            DbKind::Sync { priority } => priority,
        }
    }

    /// Server/mirror location strings (sync databases only, informational).
    pub fn servers(&self) -> Vec<String> {
        self.inner.servers.borrow().clone()
    }

    pub fn set_servers(&self, servers: Vec<String>) {
        *self.inner.servers.borrow_mut() = servers;
    }

    /// Look up a package by exact name. A miss is `None`, never an error.
    pub fn pkg(&self, name: &str) -> Option<Rc<Package>> {
        self.inner
            .pkgs
            .borrow()
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// All records, in insertion order.
    pub fn pkgcache(&self) -> Vec<Rc<Package>> {
        self.inner.pkgs.borrow().clone()
    }

    /// Packages whose name or description matches every given regexp.
    pub fn search(&self, patterns: &[&str]) -> Result<Vec<Rc<Package>>> {
        let regexes = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Parse(format!("bad pattern '{p}': {e}"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(self
            .pkgcache()
            .into_iter()
            .filter(|pkg| {
                regexes.iter().all(|re| {
                    re.is_match(&pkg.name)
                        || pkg.desc.as_deref().is_some_and(|d| re.is_match(d))
                })
            })
            .collect())
    }

    /// Members of one group, in insertion order. Unknown group is empty.
    pub fn group(&self, name: &str) -> Vec<Rc<Package>> {
        self.ensure_groups();
        self.inner
            .groups
            .borrow()
            .as_ref()
            .and_then(|groups| {
                groups
                    .iter()
                    .find(|(group, _)| group == name)
                    .map(|(_, members)| members.clone())
            })
            .unwrap_or_default()
    }

    /// The whole group index, groups in first-seen order.
    pub fn grpcache(&self) -> Vec<(String, Vec<Rc<Package>>)> {
        self.ensure_groups();
        self.inner.groups.borrow().clone().unwrap_or_default()
    }

    fn ensure_groups(&self) {
        let mut cache = self.inner.groups.borrow_mut();
        if cache.is_some() {
            return;
        }
        let mut groups: Vec<(String, Vec<Rc<Package>>)> = Vec::new();
        for pkg in self.inner.pkgs.borrow().iter() {
            for tag in &pkg.groups {
                match groups.iter_mut().find(|(name, _)| name == tag) {
                    Some((_, members)) => members.push(pkg.clone()),
                    None => groups.push((tag.clone(), vec![pkg.clone()])),
                }
            }
        }
        *cache = Some(groups);
    }

    /// Add a record, which becomes owned by this database.
    pub(crate) fn insert(&self, pkg: Package) -> Rc<Package> {
        let pkg = Rc::new(pkg);
        pkg.set_owner(Rc::downgrade(&self.inner));
        self.inner.pkgs.borrow_mut().push(pkg.clone());
        self.inner.groups.replace(None);
        pkg
    }

    /// Drop the record with this name, releasing its back-reference.
    pub(crate) fn remove(&self, name: &str) -> Option<Rc<Package>> {
        let mut pkgs = self.inner.pkgs.borrow_mut();
        let pos = pkgs.iter().position(|p| p.name == name)?;
        let pkg = pkgs.remove(pos);
        drop(pkgs);
        pkg.set_owner(std::rc::Weak::new());
        self.inner.groups.replace(None);
        Some(pkg)
    }

    /// Load the local database from a directory of `name-version/desc`
    /// entries. A missing directory is an empty database. Entries load in
    /// sorted name order so listings are reproducible.
    pub fn load_local(&self, dir: &Path) -> Result<()> {
        if !self.is_local() {
            return Err(Error::State(format!(
                "cannot load sync database {} from a local tree",
                self.name()
            )));
        }
        if !dir.exists() {
            debug!(
                "local database directory {} absent, starting empty",
                dir.display()
            );
            return Ok(());
        }

        let mut entries: Vec<_> = fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|e| e.path().is_dir())
            .map(|e| e.path())
            .collect();
        entries.sort();

        for entry in entries {
            let desc_path = entry.join("desc");
            if !desc_path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&desc_path)?;
            let pkg = desc::parse(&text)
                .map_err(|e| Error::Parse(format!("{}: {e}", desc_path.display())))?;
            self.insert(pkg);
        }

        info!(
            "loaded {} installed packages from {}",
            self.inner.pkgs.borrow().len(),
            dir.display()
        );
        Ok(())
    }

    /// Replace this sync database's records wholesale from a fetched
    /// `<name>.db` tarball (plain or gzip'd tar of `name-version/desc`).
    ///
    /// Returns `false` when the tarball is unchanged since the last refresh
    /// and `force` is not set. Transport is the caller's concern; this only
    /// reads a local file.
    pub fn refresh(&self, archive: &Path, force: bool) -> Result<bool> {
        if self.is_local() {
            return Err(Error::State(
                "unable to update the local database".to_string(),
            ));
        }

        let meta = fs::metadata(archive)?;
        let stamp = (meta.len(), meta.modified()?);
        if !force && self.inner.sync_stamp.get() == Some(stamp) {
            debug!("database {} is up to date", self.name());
            return Ok(false);
        }

        let records = read_db_archive(archive)?;
        let mut pkgs = self.inner.pkgs.borrow_mut();
        pkgs.clear();
        for pkg in records {
            let pkg = Rc::new(pkg);
            pkg.set_owner(Rc::downgrade(&self.inner));
            pkgs.push(pkg);
        }
        let count = pkgs.len();
        drop(pkgs);
        self.inner.groups.replace(None);
        self.inner.sync_stamp.set(Some(stamp));

        info!("refreshed database {} ({count} packages)", self.name());
        Ok(true)
    }
}

/// Read every `*/desc` entry of a database tarball, in archive order.
fn read_db_archive(path: &Path) -> Result<Vec<Package>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let gzipped = file.read(&mut magic)? == 2 && magic == [0x1f, 0x8b];
    let file = File::open(path)?;

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut records = Vec::new();
    let mut tar = Archive::new(reader);
    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_string_lossy().to_string();
        if !entry_path.ends_with("/desc") {
            continue;
        }
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        let pkg = desc::parse(&text)
            .map_err(|e| Error::Parse(format!("{}:{entry_path}: {e}", path.display())))?;
        records.push(pkg);
    }
    Ok(records)
}

/// Write the desc entry for `pkg` under the local database directory.
pub(crate) fn persist_entry(dir: &Path, pkg: &Package) -> Result<()> {
    let entry = dir.join(pkg.fullname());
    fs::create_dir_all(&entry)?;
    fs::write(entry.join("desc"), desc::render(pkg))?;
    Ok(())
}

/// Remove the desc entry for an uninstalled package, if present.
pub(crate) fn remove_entry(dir: &Path, fullname: &str) -> Result<()> {
    let entry = dir.join(fullname);
    if entry.exists() {
        fs::remove_dir_all(entry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped(name: &str, version: &str, group: &str) -> Package {
        let mut pkg = Package::new(name, version);
        pkg.groups = vec![group.to_string()];
        pkg
    }

    #[test]
    fn test_empty_local() {
        let db = Database::local();
        assert_eq!(db.name(), "local");
        assert!(db.pkg("foo").is_none());
        assert!(db.pkgcache().is_empty());
        assert!(db.grpcache().is_empty());
        assert!(db.search(&["bar"]).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::local();
        db.insert(Package::new("pacman", "6.0-1"));
        db.insert(Package::new("glibc", "2.34-1"));

        let pkg = db.pkg("pacman").unwrap();
        assert_eq!(pkg.version, "6.0-1");
        assert_eq!(pkg.db().unwrap().name(), "local");

        let cache = db.pkgcache();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].name, "pacman");
        assert_eq!(cache[1].name, "glibc");
    }

    #[test]
    fn test_remove_clears_back_reference() {
        let db = Database::local();
        db.insert(Package::new("pacman", "6.0-1"));
        let pkg = db.remove("pacman").unwrap();
        assert!(pkg.db().is_none());
        assert!(db.pkg("pacman").is_none());
    }

    #[test]
    fn test_record_outlives_database() {
        let pkg = {
            let db = Database::sync("core", 0);
            db.insert(Package::new("linux", "5.15-1"))
        };
        // the database handle is gone, the record is still readable
        assert_eq!(pkg.name, "linux");
        assert!(pkg.db().is_none());
    }

    #[test]
    fn test_group_cache_first_seen_order() {
        let db = Database::sync("core", 0);
        db.insert(grouped("base", "1", "base"));
        db.insert(grouped("linux", "5.15", "kernel"));
        db.insert(grouped("bash", "5.1", "base"));

        let groups = db.grpcache();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "base");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "kernel");

        assert_eq!(db.group("base").len(), 2);
        assert!(db.group("nonexistent").is_empty());
    }

    #[test]
    fn test_group_cache_invalidated_on_insert() {
        let db = Database::local();
        db.insert(grouped("base", "1", "base"));
        assert_eq!(db.group("base").len(), 1);
        db.insert(grouped("bash", "5.1", "base"));
        assert_eq!(db.group("base").len(), 2);
    }

    #[test]
    fn test_search_all_patterns_must_match() {
        let db = Database::local();
        let mut pkg = Package::new("pacman", "6.0-1");
        pkg.desc = Some("A library-based package manager".to_string());
        db.insert(pkg);

        assert_eq!(db.search(&["pac"]).unwrap().len(), 1);
        assert_eq!(db.search(&["package", "manager"]).unwrap().len(), 1);
        assert!(db.search(&["pac", "nomatch"]).unwrap().is_empty());
        assert!(db.search(&["[invalid"]).is_err());
    }

    #[test]
    fn test_refresh_rejected_on_local() {
        let db = Database::local();
        assert!(matches!(
            db.refresh(Path::new("/nonexistent.db"), false),
            Err(Error::State(_))
        ));
    }
}
