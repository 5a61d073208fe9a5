// src/lib.rs

//! Pacrat Package Engine
//!
//! Resolution and transaction engine for Arch-style binary packages:
//! version comparison, dependency satisfaction, local and sync package
//! databases, and a staged transaction state machine that applies
//! installs, upgrades, and removals to the local database.
//!
//! # Architecture
//!
//! - Databases are plain files: a directory of `desc` entries for the
//!   installed set, fetched `.db` tarballs for sync repositories
//! - Shared records: packages are reference-counted snapshots that stay
//!   valid after their owning database is dropped or refreshed
//! - One transaction at a time: transactions borrow the [`handle::Handle`]
//!   mutably and drive a [`callback::CallbackSink`] instead of printing
//! - Explicit partial failure: a failed commit reports what was applied,
//!   nothing is rolled back

pub mod callback;
pub mod config;
pub mod db;
pub mod dep;
mod error;
pub mod handle;
pub mod package;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
