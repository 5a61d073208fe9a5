// src/package/mod.rs

//! Package records
//!
//! A [`Package`] is an immutable record of one package release. Databases
//! hand records out as `Rc<Package>` snapshots: a record stays readable
//! after the database that produced it is dropped or refreshed. The record
//! keeps a weak back-reference to its owning database, used only for
//! attribution; once the database is gone, [`Package::db`] returns `None`.

pub mod archive;

use crate::db::{Database, DbInner};
use crate::dep::Depend;
use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

/// Why a package ended up installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallReason {
    /// Explicitly requested by the user
    #[default]
    Explicit,
    /// Pulled in as a dependency of another target
    Dependency,
}

/// A single package record
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub arch: Option<String>,
    pub desc: Option<String>,
    pub url: Option<String>,
    pub packager: Option<String>,
    /// Archive filename, set for sync and standalone-loaded packages
    pub filename: Option<String>,
    pub sha256sum: Option<String>,
    pub groups: Vec<String>,
    pub licenses: Vec<String>,
    pub depends: Vec<Depend>,
    pub optdepends: Vec<String>,
    pub provides: Vec<Depend>,
    pub conflicts: Vec<Depend>,
    pub replaces: Vec<Depend>,
    pub reason: InstallReason,
    /// Archive (download) size in bytes
    pub size: u64,
    /// Installed size in bytes
    pub isize: u64,
    /// Build time, seconds since the epoch (0 when unknown)
    pub builddate: i64,
    /// Install time, set by the local database on commit
    pub installdate: i64,
    owner: RefCell<Weak<DbInner>>,
}

impl Package {
    /// Bare record with the given name and version; everything else empty.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: None,
            desc: None,
            url: None,
            packager: None,
            filename: None,
            sha256sum: None,
            groups: Vec::new(),
            licenses: Vec::new(),
            depends: Vec::new(),
            optdepends: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            replaces: Vec::new(),
            reason: InstallReason::Explicit,
            size: 0,
            isize: 0,
            builddate: 0,
            installdate: 0,
            owner: RefCell::new(Weak::new()),
        }
    }

    /// `name-version`, the conventional directory name for the record.
    pub fn fullname(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// The database this record currently belongs to, or `None` for a
    /// standalone record or after the owning database has been dropped.
    pub fn db(&self) -> Option<Database> {
        self.owner.borrow().upgrade().map(Database::from_inner)
    }

    pub(crate) fn set_owner(&self, owner: Weak<DbInner>) {
        *self.owner.borrow_mut() = owner;
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullname() {
        let pkg = Package::new("pacman", "6.0-1");
        assert_eq!(pkg.fullname(), "pacman-6.0-1");
        assert_eq!(pkg.to_string(), "pacman-6.0-1");
    }

    #[test]
    fn test_standalone_has_no_db() {
        let pkg = Package::new("pacman", "6.0-1");
        assert!(pkg.db().is_none());
    }

    #[test]
    fn test_default_reason_is_explicit() {
        assert_eq!(Package::new("a", "1").reason, InstallReason::Explicit);
    }
}
