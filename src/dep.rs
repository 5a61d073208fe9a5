// src/dep.rs

//! Dependency specifications and satisfaction matching
//!
//! A requirement spec is written `name[<|<=|=|>=|>]version` with no spaces.
//! Matching is a single-clause relational satisfier: a package fulfills a
//! spec either by its own name and version, or by one of its `provides`
//! entries. There is no global solving here; resolution walks candidate
//! lists in input order and the first satisfier wins.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::version::vercmp;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Relational operator of a versioned requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessEq,
    Equal,
    GreaterEq,
    Greater,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Equal => "=",
            CompareOp::GreaterEq => ">=",
            CompareOp::Greater => ">",
        }
    }

    /// Whether `have` relates to `want` as this operator demands.
    fn matches(self, have: &str, want: &str) -> bool {
        match (self, vercmp(have, want)) {
            (CompareOp::Less, Ordering::Less) => true,
            (CompareOp::LessEq, Ordering::Less | Ordering::Equal) => true,
            (CompareOp::Equal, Ordering::Equal) => true,
            (CompareOp::GreaterEq, Ordering::Greater | Ordering::Equal) => true,
            (CompareOp::Greater, Ordering::Greater) => true,
            _ => false,
        }
    }
}

/// A parsed dependency specification: a name plus an optional version
/// constraint. A bare name matches by name or provides-name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depend {
    pub name: String,
    pub constraint: Option<(CompareOp, String)>,
}

impl Depend {
    /// Unversioned spec matching any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    /// True if `pkg` fulfills this spec.
    ///
    /// A name match is checked against the package's own version; a
    /// provides match is checked against the provides entry's version. An
    /// unversioned provides entry never satisfies a versioned spec.
    pub fn satisfied_by(&self, pkg: &Package) -> bool {
        if pkg.name == self.name {
            return match &self.constraint {
                None => true,
                Some((op, want)) => op.matches(&pkg.version, want),
            };
        }

        pkg.provides.iter().any(|prov| {
            if prov.name != self.name {
                return false;
            }
            match (&self.constraint, &prov.constraint) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some((op, want)), Some((_, have))) => op.matches(have, want),
            }
        })
    }
}

impl FromStr for Depend {
    type Err = Error;

    /// Parse `name[<|<=|=|>=|>]version`. Two-character operators are tried
    /// before one-character ones so `<=` is never read as `<` `=version`.
    fn from_str(s: &str) -> Result<Self> {
        let ops = [
            ("<=", CompareOp::LessEq),
            (">=", CompareOp::GreaterEq),
            ("<", CompareOp::Less),
            (">", CompareOp::Greater),
            ("=", CompareOp::Equal),
        ];

        for (text, op) in ops {
            if let Some(pos) = s.find(text) {
                let name = &s[..pos];
                let version = &s[pos + text.len()..];
                if name.is_empty() {
                    return Err(Error::Parse(format!("dependency '{s}' has no name")));
                }
                if version.is_empty() {
                    return Err(Error::Parse(format!(
                        "dependency '{s}' has an operator but no version"
                    )));
                }
                return Ok(Self {
                    name: name.to_string(),
                    constraint: Some((op, version.to_string())),
                });
            }
        }

        if s.is_empty() {
            return Err(Error::Parse("empty dependency spec".to_string()));
        }
        Ok(Self::new(s))
    }
}

impl fmt::Display for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            None => write!(f, "{}", self.name),
            Some((op, version)) => write!(f, "{}{}{}", self.name, op.as_str(), version),
        }
    }
}

/// Find the first package in `candidates` satisfying `spec_text`.
///
/// The result depends only on input order. An empty candidate list or no
/// match yields `None`; only a malformed spec is an error.
pub fn find_satisfier(candidates: &[Rc<Package>], spec_text: &str) -> Result<Option<Rc<Package>>> {
    let spec: Depend = spec_text.parse()?;
    Ok(candidates
        .iter()
        .find(|pkg| spec.satisfied_by(pkg))
        .cloned())
}

/// Collect the members of `group` across `dbs`, in database order then
/// group-cache order. Copies of the same package name in several databases
/// are all reported; nothing is deduplicated.
pub fn find_group_pkgs(dbs: &[Database], group: &str) -> Vec<Rc<Package>> {
    let mut members = Vec::new();
    for db in dbs {
        members.extend(db.group(group));
    }
    members
}

/// Find an available upgrade for `pkg` in a list of sync databases.
///
/// Databases are scanned in order and the first same-name candidate whose
/// version compares strictly newer is returned. This is a first-match
/// policy, not a best-match search across all databases.
pub fn sync_newversion(pkg: &Package, sync_dbs: &[Database]) -> Option<Rc<Package>> {
    for db in sync_dbs {
        if let Some(candidate) = db.pkg(&pkg.name) {
            if vercmp(&candidate.version, &pkg.version) == Ordering::Greater {
                return Some(candidate);
            }
        }
    }
    None
}

/// Names of packages in `db` with at least one dependency satisfied by
/// `pkg`, in database order.
pub fn compute_requiredby(pkg: &Package, db: &Database) -> Vec<String> {
    db.pkgcache()
        .iter()
        .filter(|other| other.name != pkg.name)
        .filter(|other| other.depends.iter().any(|dep| dep.satisfied_by(pkg)))
        .map(|other| other.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> Rc<Package> {
        Rc::new(Package::new(name, version))
    }

    #[test]
    fn test_parse_bare_name() {
        let dep: Depend = "glibc".parse().unwrap();
        assert_eq!(dep.name, "glibc");
        assert!(dep.constraint.is_none());
    }

    #[test]
    fn test_parse_operators() {
        let dep: Depend = "glibc>=2.34".parse().unwrap();
        assert_eq!(dep.constraint, Some((CompareOp::GreaterEq, "2.34".into())));

        let dep: Depend = "glibc<=2.34".parse().unwrap();
        assert_eq!(dep.constraint, Some((CompareOp::LessEq, "2.34".into())));

        let dep: Depend = "glibc=2.34-1".parse().unwrap();
        assert_eq!(dep.constraint, Some((CompareOp::Equal, "2.34-1".into())));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<Depend>().is_err());
        assert!(">=1.0".parse::<Depend>().is_err());
        assert!("glibc>=".parse::<Depend>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["pacman", "pacman>=6.0-2", "pacman<6", "pacman<=6", "pacman=6.0.1"] {
            let dep: Depend = text.parse().unwrap();
            assert_eq!(dep.to_string(), text);
        }
    }

    #[test]
    fn test_satisfied_by_name() {
        let p = pkg("pacman", "6.0-1");
        assert!(Depend::new("pacman").satisfied_by(&p));
        assert!("pacman>=6.0".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!"pacman>=6.0-2".parse::<Depend>().unwrap().satisfied_by(&p));
        assert!(!Depend::new("yaourt").satisfied_by(&p));
    }

    #[test]
    fn test_satisfied_by_provides() {
        let mut p = Package::new("pacman-git", "6.1");
        p.provides = vec!["pacman=6.0".parse().unwrap()];

        assert!(Depend::new("pacman").satisfied_by(&p));
        assert!("pacman>=6.0".parse::<Depend>().unwrap().satisfied_by(&p));
        // the provides version, not the package's own, is what counts
        assert!(!"pacman>=6.1".parse::<Depend>().unwrap().satisfied_by(&p));
    }

    #[test]
    fn test_unversioned_provides_never_satisfies_versioned_spec() {
        let mut p = Package::new("pacman-git", "6.1");
        p.provides = vec![Depend::new("pacman")];

        assert!(Depend::new("pacman").satisfied_by(&p));
        assert!(!"pacman>=1".parse::<Depend>().unwrap().satisfied_by(&p));
    }

    #[test]
    fn test_find_satisfier_empty() {
        assert!(find_satisfier(&[], "foo").unwrap().is_none());
    }

    #[test]
    fn test_find_satisfier_first_match() {
        let a = pkg("pacman", "6.0-1");
        let b = pkg("pacman", "6.0-2");
        let list = vec![a.clone(), b];

        let found = find_satisfier(&list, "pacman").unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &a));
        assert!(find_satisfier(&list, "pacman>=6.0-2").unwrap().is_some());
        assert!(find_satisfier(&[a], "pacman>=6.0-2").unwrap().is_none());
    }

    #[test]
    fn test_find_satisfier_bad_spec() {
        assert!(find_satisfier(&[], ">=1.0").is_err());
    }

    #[test]
    fn test_group_members_reported_per_database() {
        let core = Database::sync("core", 0);
        let extra = Database::sync("extra", 10);
        let mut bash = Package::new("bash", "5.1-1");
        bash.groups = vec!["base".to_string()];
        core.insert(bash.clone());
        extra.insert(bash);

        // the same member in two databases yields both copies, undeduplicated
        let sync_dbs = [core, extra];
        let members = find_group_pkgs(&sync_dbs, "base");
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|p| p.name == "bash"));
        assert_eq!(members[0].db().unwrap().name(), "core");
        assert_eq!(members[1].db().unwrap().name(), "extra");

        let dbs = [Database::local()];
        assert!(find_group_pkgs(&dbs, "base").is_empty());
    }

    #[test]
    fn test_compute_requiredby_lists_dependents() {
        let db = Database::local();
        let zlib = db.insert(Package::new("zlib", "1.3-1"));
        let mut app = Package::new("app", "1-1");
        app.depends = vec!["zlib>=1.2".parse().unwrap()];
        db.insert(app);
        db.insert(Package::new("unrelated", "1-1"));

        assert_eq!(compute_requiredby(&zlib, &db), vec!["app"]);
        let unrelated = db.pkg("unrelated").unwrap();
        assert!(compute_requiredby(&unrelated, &db).is_empty());
    }

    #[test]
    fn test_compute_requiredby_through_provides() {
        let db = Database::local();
        let mut openssl = Package::new("openssl", "3.2-1");
        openssl.provides = vec!["libcrypto.so=3".parse().unwrap()];
        let openssl = db.insert(openssl);
        let mut app = Package::new("app", "1-1");
        app.depends = vec!["libcrypto.so".parse().unwrap()];
        db.insert(app);

        assert_eq!(compute_requiredby(&openssl, &db), vec!["app"]);
    }
}
