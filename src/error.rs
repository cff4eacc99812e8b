use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile \"default\" is reserved")]
    ReservedProfile,
    #[error("profile {0} already exists")]
    AlreadyExists(String),
    #[error("profile {0} not found")]
    NotFound(String),
    #[error("no backup available for profile {0}")]
    NoBackup(String),
    #[error("profile storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("profile bundle could not be written: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("unsupported bundle schema {0}")]
    UnsupportedSchema(String),
    #[error("bundle tensor {name} has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("bundle could not be parsed: {0}")]
    Json(#[from] serde_json::Error),
}
