// src/error.rs

use thiserror::Error;

/// Core error types for pacrat
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed version string or requirement spec
    #[error("parse error: {0}")]
    Parse(String),

    /// Package or database lookup miss where a hit was required
    #[error("target not found: {0}")]
    NotFound(String),

    /// A package file could not be read as a package
    #[error("invalid package {path}: {reason}")]
    InvalidPackage { path: String, reason: String },

    /// A dependency could not be satisfied during prepare()
    #[error("could not satisfy dependencies: '{spec}' required by {required_by}")]
    UnsatisfiedDependency { spec: String, required_by: String },

    /// Two packages in the transaction conflict
    #[error("package conflict: {first} conflicts with {second}")]
    Conflict { first: String, second: String },

    /// A removal target is still required by installed packages
    #[error("{target} is required by: {}", dependents.join(", "))]
    RequiredBy {
        target: String,
        dependents: Vec<String>,
    },

    /// A removal target is configured as a hold package
    #[error("{0} is designated as a hold package")]
    Hold(String),

    /// Commit aborted partway; `applied` lists targets already applied
    #[error("transaction failed on {target}: {reason}")]
    Commit {
        target: String,
        reason: String,
        applied: Vec<String>,
    },

    /// Operation invoked in the wrong transaction state
    #[error("{0}")]
    State(String),
}

/// Result type alias using pacrat's Error type
pub type Result<T> = std::result::Result<T, Error>;
