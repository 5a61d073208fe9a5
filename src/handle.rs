// src/handle.rs

//! The engine context
//!
//! A [`Handle`] owns the configuration, the local database, and the sync
//! databases in priority order. Transactions borrow the handle mutably, so
//! only one can exist at a time and none can outlive its context.

use crate::callback::CallbackSink;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::transaction::{Transaction, TransactionFlags};
use tracing::debug;

/// Context owning the databases a transaction resolves against
#[derive(Debug)]
pub struct Handle {
    config: Config,
    local: Database,
    syncs: Vec<Database>,
}

impl Handle {
    /// Build a context from a validated configuration: loads the local
    /// database from `<dbpath>/local` and registers every configured sync
    /// repository (initially empty until refreshed).
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let local = Database::local();
        local.load_local(&config.local_dir())?;

        let mut handle = Self {
            config,
            local,
            syncs: Vec::new(),
        };
        for repo in handle.config.sync_repositories.clone() {
            let db = handle.register_syncdb(&repo.name, repo.priority);
            db.set_servers(repo.servers);
        }
        Ok(handle)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The installed-packages database.
    pub fn localdb(&self) -> &Database {
        &self.local
    }

    /// Sync databases, in priority then registration order.
    pub fn syncdbs(&self) -> &[Database] {
        &self.syncs
    }

    pub fn syncdb(&self, name: &str) -> Option<&Database> {
        self.syncs.iter().find(|db| db.name() == name)
    }

    /// Register a sync database. Lower priority sorts earlier; equal
    /// priorities keep registration order.
    pub fn register_syncdb(&mut self, name: &str, priority: i64) -> Database {
        let db = Database::sync(name, priority);
        let pos = self
            .syncs
            .iter()
            .position(|existing| existing.priority() > priority)
            .unwrap_or(self.syncs.len());
        self.syncs.insert(pos, db.clone());
        debug!("registered sync database {name} at priority {priority}");
        db
    }

    /// Start a transaction against this context. The mutable borrow keeps
    /// it exclusive until released or dropped.
    pub fn transaction<'h>(
        &'h mut self,
        flags: TransactionFlags,
        sink: &'h mut dyn CallbackSink,
    ) -> Transaction<'h> {
        Transaction::new(self, flags, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> Handle {
        let config = Config {
            dbpath: "/nonexistent-for-tests".into(),
            ..Config::default()
        };
        Handle::new(config).unwrap()
    }

    #[test]
    fn test_empty_handle() {
        let h = handle();
        assert!(h.syncdbs().is_empty());
        assert!(h.localdb().pkgcache().is_empty());
    }

    #[test]
    fn test_register_syncdb_priority_order() {
        let mut h = handle();
        h.register_syncdb("extra", 10);
        h.register_syncdb("core", 0);
        h.register_syncdb("community", 10);

        let names: Vec<String> = h.syncdbs().iter().map(Database::name).collect();
        assert_eq!(names, vec!["core", "extra", "community"]);
    }

    #[test]
    fn test_syncdb_lookup() {
        let mut h = handle();
        h.register_syncdb("core", 0);
        assert!(h.syncdb("core").is_some());
        assert!(h.syncdb("extra").is_none());
    }
}
