// src/transaction.rs

//! The transaction state machine
//!
//! A transaction stages add/remove targets against a [`Handle`], resolves
//! them during [`Transaction::prepare`] (dependency pulling, conflict
//! detection, required-by checks) and applies the resolved change set to
//! the local database during [`Transaction::commit`], streaming events,
//! progress, and download notifications through the attached
//! [`CallbackSink`].
//!
//! States: `Idle` accepts targets, `prepare()` moves to `Prepared` or
//! `Failed`, `commit()` to `Committed` or `Failed`. `release()` works from
//! any state and is idempotent; every other operation fails afterwards.
//! A failed transaction is terminal; retrying means building a new one.
//!
//! Commit has explicit partial-failure semantics: the first error aborts
//! the remaining targets but already-applied targets stay applied. There
//! is no hidden rollback.

use crate::callback::{CallbackSink, Event, LogLevel, Question};
use crate::db;
use crate::dep::{self, Depend};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::package::{InstallReason, Package};
use crate::version::vercmp;
use chrono::Local;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, warn};

/// How far removal follows dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoveDepth {
    /// Dependents block the removal
    #[default]
    None,
    /// Remove direct dependents too
    Direct,
    /// Remove transitive dependents
    All,
}

/// Behavior switches for one transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFlags {
    /// Skip dependency resolution entirely
    pub no_deps: bool,
    /// Touch only database records, no payload concerns
    pub db_only: bool,
    /// Remove dependents of removal targets at one level
    pub cascade: bool,
    /// Dependent-following depth for removals
    pub recurse: RemoveDepth,
    /// Resolve conflicts by removing the installed side
    pub force: bool,
    /// Do not keep backup copies of displaced files
    pub no_save: bool,
    /// Stop after the download phase
    pub download_only: bool,
    /// Record every added package as explicitly installed
    pub all_explicit: bool,
    /// Record every added package as a dependency
    pub all_deps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Prepared,
    Committed,
    Failed,
    Released,
}

/// Clonable cancellation signal checked between commit targets.
///
/// Hand one to a callback sink before committing; calling
/// [`InterruptToken::interrupt`] makes the commit abort at the next target
/// boundary with partial-failure semantics.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken(Rc<Cell<bool>>);

impl InterruptToken {
    pub fn interrupt(&self) {
        self.0.set(true);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.get()
    }
}

/// A staged set of package changes against one context
pub struct Transaction<'h> {
    handle: &'h Handle,
    sink: &'h mut dyn CallbackSink,
    flags: TransactionFlags,
    state: TransactionState,
    add: Vec<Rc<Package>>,
    remove: Vec<Rc<Package>>,
    to_add: Vec<Rc<Package>>,
    to_remove: Vec<Rc<Package>>,
    /// Names staged through `add_pkg`, kept explicit at commit
    explicit: HashSet<String>,
    interrupt: InterruptToken,
    committing: bool,
}

impl<'h> Transaction<'h> {
    pub(crate) fn new(
        handle: &'h Handle,
        flags: TransactionFlags,
        sink: &'h mut dyn CallbackSink,
    ) -> Self {
        Self {
            handle,
            sink,
            flags,
            state: TransactionState::Idle,
            add: Vec::new(),
            remove: Vec::new(),
            to_add: Vec::new(),
            to_remove: Vec::new(),
            explicit: HashSet::new(),
            interrupt: InterruptToken::default(),
            committing: false,
        }
    }

    pub fn flags(&self) -> TransactionFlags {
        self.flags
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The resolved addition set, populated by `prepare()`, ordered so
    /// dependencies come before their dependents.
    pub fn to_add(&self) -> &[Rc<Package>] {
        &self.to_add
    }

    /// The resolved removal set, populated by `prepare()`, ordered so
    /// dependents come before their dependencies.
    pub fn to_remove(&self) -> &[Rc<Package>] {
        &self.to_remove
    }

    /// Token for requesting cancellation from inside a callback.
    pub fn interrupter(&self) -> InterruptToken {
        self.interrupt.clone()
    }

    /// Stage a package for addition. Valid in `Idle` only.
    pub fn add_pkg(&mut self, pkg: Rc<Package>) -> Result<()> {
        self.ensure_idle()?;
        if self.add.iter().any(|p| p.name == pkg.name) {
            return Err(Error::State(format!(
                "unable to update transaction: duplicate target {}",
                pkg.name
            )));
        }
        self.explicit.insert(pkg.name.clone());
        self.add.push(pkg);
        Ok(())
    }

    /// Stage an installed package for removal. Valid in `Idle` only.
    pub fn remove_pkg(&mut self, pkg: Rc<Package>) -> Result<()> {
        self.ensure_idle()?;
        if self.handle.localdb().pkg(&pkg.name).is_none() {
            return Err(Error::NotFound(pkg.name.clone()));
        }
        if self.remove.iter().any(|p| p.name == pkg.name) {
            return Err(Error::State(format!(
                "unable to update transaction: duplicate target {}",
                pkg.name
            )));
        }
        self.remove.push(pkg);
        Ok(())
    }

    /// Stage an upgrade for every installed package with a newer sync
    /// candidate (first match across sync databases). With
    /// `enable_downgrade`, any version difference counts. Packages that a
    /// sync candidate declares to replace are staged as replace pairs,
    /// subject to the sink's answer.
    pub fn sysupgrade(&mut self, enable_downgrade: bool) -> Result<()> {
        self.ensure_idle()?;
        let handle = self.handle;

        for pkg in handle.localdb().pkgcache() {
            if self.add.iter().any(|a| a.name == pkg.name) {
                continue;
            }

            if let Some(replacement) = find_replacement(handle, &pkg) {
                let question = Question::Replace {
                    old: pkg.name.clone(),
                    new: replacement.name.clone(),
                };
                if self.sink.on_question(&question) {
                    if !self.add.iter().any(|a| a.name == replacement.name) {
                        self.add.push(replacement);
                    }
                    self.remove.push(pkg);
                }
                continue;
            }

            let candidate = if enable_downgrade {
                handle
                    .syncdbs()
                    .iter()
                    .find_map(|db| db.pkg(&pkg.name))
                    .filter(|c| vercmp(&c.version, &pkg.version) != Ordering::Equal)
            } else {
                dep::sync_newversion(&pkg, handle.syncdbs())
            };
            if let Some(candidate) = candidate {
                debug!("sysupgrade: {} -> {}", pkg.fullname(), candidate.version);
                self.add.push(candidate);
            }
        }
        Ok(())
    }

    /// Resolve the staged targets into `to_add`/`to_remove`.
    ///
    /// Moves the transaction to `Prepared`, or to `Failed` carrying the
    /// first unsatisfied dependency, conflict, or required-by error.
    pub fn prepare(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let handle = self.handle;
        let installed = handle.localdb().pkgcache();
        let mut to_add = self.add.clone();
        let mut to_remove = self.remove.clone();

        // Dependency resolution over a growing worklist: each add target's
        // depends must be satisfied by a surviving installed package,
        // another addition, or a sync database package pulled in here.
        self.sink.on_event(&Event::ResolveDepsStart);
        if !self.flags.no_deps {
            let mut idx = 0;
            while idx < to_add.len() {
                let pkg = to_add[idx].clone();
                for spec in &pkg.depends {
                    if satisfied_by_change_set(spec, &installed, &to_add, &to_remove) {
                        continue;
                    }
                    let pulled = handle
                        .syncdbs()
                        .iter()
                        .find_map(|sync| first_satisfier(spec, &sync.pkgcache()));
                    match pulled {
                        Some(extra) => {
                            debug!("pulling in {} for {}", extra.fullname(), pkg.name);
                            to_add.push(extra);
                        }
                        None => {
                            self.state = TransactionState::Failed;
                            return Err(Error::UnsatisfiedDependency {
                                spec: spec.to_string(),
                                required_by: pkg.name.clone(),
                            });
                        }
                    }
                }
                idx += 1;
            }
        }
        self.sink.on_event(&Event::ResolveDepsDone);

        // Conflict detection between additions, and between each addition
        // and the surviving installed set (both directions).
        self.sink.on_event(&Event::InterConflictsStart);
        for i in 0..to_add.len() {
            let added = to_add[i].clone();
            for other in to_add.iter().skip(i + 1) {
                if conflict_between(&added, other) {
                    self.state = TransactionState::Failed;
                    return Err(Error::Conflict {
                        first: added.name.clone(),
                        second: other.name.clone(),
                    });
                }
            }
            for inst in &installed {
                if inst.name == added.name
                    || to_remove.iter().any(|r| r.name == inst.name)
                    || to_add.iter().any(|a| a.name == inst.name)
                {
                    continue;
                }
                if !conflict_between(&added, inst) {
                    continue;
                }
                let question = Question::ConflictRemove {
                    first: added.name.clone(),
                    second: inst.name.clone(),
                };
                if self.flags.force || self.sink.on_question(&question) {
                    debug!("conflict: removing installed {}", inst.fullname());
                    to_remove.push(inst.clone());
                } else {
                    self.state = TransactionState::Failed;
                    return Err(Error::Conflict {
                        first: added.name.clone(),
                        second: inst.name.clone(),
                    });
                }
            }
        }
        self.sink.on_event(&Event::InterConflictsDone);

        // Removal closure: installed packages left with a dependency that
        // only removed packages satisfy either block the transaction or
        // join the removal set, depending on cascade/recurse depth.
        let max_depth = match (self.flags.cascade, self.flags.recurse) {
            (_, RemoveDepth::All) => usize::MAX,
            (true, _) | (_, RemoveDepth::Direct) => 1,
            (false, RemoveDepth::None) => 0,
        };
        let mut depth = 0;
        while !self.flags.no_deps {
            let broken = broken_dependents(&installed, &to_add, &to_remove);
            if broken.is_empty() {
                break;
            }
            if depth >= max_depth {
                let (_, target) = broken[0].clone();
                let mut dependents: Vec<String> =
                    broken.iter().map(|(d, _)| d.name.clone()).collect();
                dependents.dedup();
                self.state = TransactionState::Failed;
                return Err(Error::RequiredBy { target, dependents });
            }
            to_remove.extend(broken.into_iter().map(|(dependent, _)| dependent));
            depth += 1;
        }

        // Hold packages prompt before leaving the transaction; the default
        // answer keeps them installed.
        for pkg in &to_remove {
            if !handle.config().hold_packages.contains(&pkg.name) {
                continue;
            }
            let question = Question::RemoveHold {
                name: pkg.name.clone(),
            };
            if !self.sink.on_question(&question) {
                self.state = TransactionState::Failed;
                return Err(Error::Hold(pkg.name.clone()));
            }
        }

        self.to_add = sort_by_deps(to_add);
        self.to_remove = {
            let mut sorted = sort_by_deps(to_remove);
            sorted.reverse();
            sorted
        };
        self.state = TransactionState::Prepared;
        Ok(())
    }

    /// Apply the resolved change set to the local database.
    ///
    /// Valid from `Prepared` only. Removals run before additions; the
    /// first failure aborts the remaining targets and surfaces as
    /// [`Error::Commit`] listing what was already applied.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state != TransactionState::Prepared {
            return Err(Error::State(
                "transaction failed: commit() requires a prepared transaction".to_string(),
            ));
        }

        self.committing = true;
        let result = self.run_commit();
        self.committing = false;
        match result {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                Err(e)
            }
        }
    }

    fn run_commit(&mut self) -> Result<()> {
        let handle = self.handle;
        let local = handle.localdb();
        let local_dir = handle.config().local_dir();
        let n_targets = self.to_remove.len() + self.to_add.len();
        let mut applied: Vec<String> = Vec::new();
        let mut current = 0usize;

        self.sink.on_event(&Event::TransactionStart);

        // Download phase: report byte counters for sync-origin targets.
        // Standalone file targets need no fetch; transport itself is the
        // caller's collaborator.
        if !self.flags.db_only {
            for pkg in self.to_add.clone() {
                let from_sync = pkg.db().is_some_and(|owner| !owner.is_local());
                let Some(filename) = pkg.filename.clone() else {
                    continue;
                };
                if from_sync {
                    self.sink.on_event(&Event::RetrieveStart(filename.clone()));
                    self.sink.on_download(&filename, 0, pkg.size);
                    self.sink.on_download(&filename, pkg.size, pkg.size);
                    self.sink.on_event(&Event::RetrieveDone(filename));
                }
            }
        }
        if self.flags.download_only {
            self.sink.on_event(&Event::TransactionDone);
            return Ok(());
        }

        for pkg in self.to_remove.clone() {
            current += 1;
            self.check_interrupt(&pkg, &applied)?;
            self.sink.on_event(&Event::RemoveStart(pkg.name.clone()));
            self.sink.on_progress(&pkg.name, 0, n_targets, current);

            let removed = local.remove(&pkg.name).ok_or_else(|| Error::Commit {
                target: pkg.fullname(),
                reason: "package is not installed".to_string(),
                applied: applied.clone(),
            })?;
            db::remove_entry(&local_dir, &removed.fullname()).map_err(|e| Error::Commit {
                target: pkg.fullname(),
                reason: e.to_string(),
                applied: applied.clone(),
            })?;

            self.log_action(&format!("removed {} ({})", removed.name, removed.version));
            self.sink.on_progress(&pkg.name, 100, n_targets, current);
            self.sink.on_event(&Event::RemoveDone(pkg.name.clone()));
            applied.push(removed.fullname());
        }

        for pkg in self.to_add.clone() {
            current += 1;
            self.check_interrupt(&pkg, &applied)?;
            let previous = local.pkg(&pkg.name);
            let start = match &previous {
                Some(_) => Event::UpgradeStart(pkg.name.clone()),
                None => Event::AddStart(pkg.name.clone()),
            };
            self.sink.on_event(&start);
            self.sink.on_progress(&pkg.name, 0, n_targets, current);

            let mut record = (*pkg).clone();
            record.installdate = Local::now().timestamp();
            record.reason = self.install_reason(&pkg.name, previous.as_deref());

            if let Some(old) = &previous {
                local.remove(&old.name);
                db::remove_entry(&local_dir, &old.fullname()).map_err(|e| Error::Commit {
                    target: pkg.fullname(),
                    reason: e.to_string(),
                    applied: applied.clone(),
                })?;
            }
            let installed = local.insert(record);
            db::persist_entry(&local_dir, &installed).map_err(|e| Error::Commit {
                target: pkg.fullname(),
                reason: e.to_string(),
                applied: applied.clone(),
            })?;

            match &previous {
                Some(old) => {
                    self.log_action(&format!(
                        "upgraded {} ({} -> {})",
                        installed.name, old.version, installed.version
                    ));
                    self.sink.on_progress(&pkg.name, 100, n_targets, current);
                    self.sink.on_event(&Event::UpgradeDone(pkg.name.clone()));
                }
                None => {
                    self.log_action(&format!(
                        "installed {} ({})",
                        installed.name, installed.version
                    ));
                    self.sink.on_progress(&pkg.name, 100, n_targets, current);
                    self.sink.on_event(&Event::AddDone(pkg.name.clone()));
                }
            }
            applied.push(installed.fullname());
        }

        self.sink.on_event(&Event::TransactionDone);
        Ok(())
    }

    /// Request cancellation of an in-progress commit.
    ///
    /// Calling this when no commit is running is an error. Since `commit()`
    /// holds the transaction exclusively for its whole duration, callers
    /// outside a callback can never observe `committing`; in practice this
    /// method surfaces the "unable to interrupt" contract error, and live
    /// cancellation flows through the [`InterruptToken`] from
    /// [`Transaction::interrupter`], which sinks may trigger mid-commit.
    pub fn interrupt(&self) -> Result<()> {
        if !self.committing {
            return Err(Error::State(
                "unable to interrupt transaction".to_string(),
            ));
        }
        self.interrupt.interrupt();
        Ok(())
    }

    /// Tear the transaction down. Safe to call twice; any other operation
    /// afterwards fails with a state error.
    pub fn release(&mut self) {
        self.state = TransactionState::Released;
    }

    fn install_reason(&self, name: &str, previous: Option<&Package>) -> InstallReason {
        if self.flags.all_deps {
            InstallReason::Dependency
        } else if self.flags.all_explicit || self.explicit.contains(name) {
            InstallReason::Explicit
        } else if let Some(old) = previous {
            // implicit upgrades keep the reason already on record
            old.reason
        } else {
            InstallReason::Dependency
        }
    }

    fn check_interrupt(&self, pkg: &Package, applied: &[String]) -> Result<()> {
        if self.interrupt.is_interrupted() {
            return Err(Error::Commit {
                target: pkg.fullname(),
                reason: "transaction interrupted".to_string(),
                applied: applied.to_vec(),
            });
        }
        Ok(())
    }

    fn log_action(&mut self, message: &str) {
        self.sink.on_log(LogLevel::Debug, message);
        let logfile = self.handle.config().logfile.clone();
        match OpenOptions::new().create(true).append(true).open(&logfile) {
            Ok(mut file) => {
                let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S");
                let _ = writeln!(file, "[{stamp}] {message}");
            }
            Err(e) => warn!("cannot append to {}: {e}", logfile.display()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == TransactionState::Released {
            return Err(Error::State(
                "transaction was already released".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        self.ensure_open()?;
        if self.state != TransactionState::Idle {
            return Err(Error::State(format!(
                "operation requires an idle transaction (state is {:?})",
                self.state
            )));
        }
        Ok(())
    }
}

/// First package in `candidates` satisfying `spec`, input order.
fn first_satisfier(spec: &Depend, candidates: &[Rc<Package>]) -> Option<Rc<Package>> {
    candidates
        .iter()
        .find(|pkg| spec.satisfied_by(pkg))
        .cloned()
}

/// Whether `spec` is satisfied by the post-transaction package set:
/// additions plus installed packages that are neither removed nor
/// displaced by a same-name addition.
fn satisfied_by_change_set(
    spec: &Depend,
    installed: &[Rc<Package>],
    to_add: &[Rc<Package>],
    to_remove: &[Rc<Package>],
) -> bool {
    if to_add.iter().any(|pkg| spec.satisfied_by(pkg)) {
        return true;
    }
    installed
        .iter()
        .filter(|pkg| !to_remove.iter().any(|r| r.name == pkg.name))
        .filter(|pkg| !to_add.iter().any(|a| a.name == pkg.name))
        .any(|pkg| spec.satisfied_by(pkg))
}

/// True if either package's conflicts-list is satisfied by the other.
fn conflict_between(a: &Package, b: &Package) -> bool {
    a.conflicts.iter().any(|c| c.satisfied_by(b)) || b.conflicts.iter().any(|c| c.satisfied_by(a))
}

/// Installed packages with a dependency that only removed packages
/// satisfy, paired with the removal target that breaks them.
fn broken_dependents(
    installed: &[Rc<Package>],
    to_add: &[Rc<Package>],
    to_remove: &[Rc<Package>],
) -> Vec<(Rc<Package>, String)> {
    let mut broken = Vec::new();
    for pkg in installed {
        if to_remove.iter().any(|r| r.name == pkg.name)
            || to_add.iter().any(|a| a.name == pkg.name)
        {
            continue;
        }
        for spec in &pkg.depends {
            let Some(target) = to_remove.iter().find(|t| spec.satisfied_by(t)) else {
                continue;
            };
            if !satisfied_by_change_set(spec, installed, to_add, to_remove) {
                broken.push((pkg.clone(), target.name.clone()));
                break;
            }
        }
    }
    broken
}

/// First sync package declaring it replaces `pkg`, scanning databases in
/// order.
fn find_replacement(handle: &Handle, pkg: &Package) -> Option<Rc<Package>> {
    for sync in handle.syncdbs() {
        for candidate in sync.pkgcache() {
            if candidate.name != pkg.name
                && candidate.replaces.iter().any(|r| r.satisfied_by(pkg))
            {
                return Some(candidate);
            }
        }
    }
    None
}

/// Order packages so every dependency satisfied within the set comes
/// before its dependent. Unrelated packages keep their input order;
/// cycles are tolerated by keeping the first-visited package early.
fn sort_by_deps(pkgs: Vec<Rc<Package>>) -> Vec<Rc<Package>> {
    fn visit(
        i: usize,
        pkgs: &[Rc<Package>],
        visited: &mut [bool],
        visiting: &mut [bool],
        sorted: &mut Vec<Rc<Package>>,
    ) {
        if visited[i] || visiting[i] {
            return;
        }
        visiting[i] = true;
        for spec in &pkgs[i].depends {
            for (j, other) in pkgs.iter().enumerate() {
                if j != i && spec.satisfied_by(other) {
                    visit(j, pkgs, visited, visiting, sorted);
                }
            }
        }
        visiting[i] = false;
        visited[i] = true;
        sorted.push(pkgs[i].clone());
    }

    let mut sorted = Vec::with_capacity(pkgs.len());
    let mut visited = vec![false; pkgs.len()];
    let mut visiting = vec![false; pkgs.len()];
    for i in 0..pkgs.len() {
        visit(i, &pkgs, &mut visited, &mut visiting, &mut sorted);
    }
    sorted
}
