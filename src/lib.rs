//! vidjot - A command-line client for a personal video journal
//!
//! Uploads videos straight to storage through pre-signed URLs, hands them to
//! the backend's AI pipeline, and follows the pipeline's progress live.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod monitor;
pub mod session;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

/// Main error type for vidjot
#[derive(Error, Debug)]
pub enum VidjotError {
    #[error("Invalid file: {0}")]
    Validation(String),

    #[error("Not signed in: {0}")]
    Auth(String),

    #[error("Could not obtain an upload destination: {0}")]
    Ticket(String),

    #[error("Upload failed: {0}")]
    Transfer(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Could not create the video record: {0}")]
    RecordCreation(String),

    #[error("Could not start processing: {0}")]
    ProcessingStart(String),

    #[error("Progress stream error: {0}")]
    Channel(String),

    #[error("Status poll failed: {0}")]
    Poll(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already watching video {0}")]
    AlreadySubscribed(String),

    #[error("{0}")]
    Other(String),
}

impl VidjotError {
    /// Re-tag a plain transport failure as the error kind of the step that hit it.
    ///
    /// Auth, cancellation and already-classified errors pass through untouched.
    pub fn reclassify(self, kind: fn(String) -> VidjotError) -> VidjotError {
        match self {
            VidjotError::Api { .. }
            | VidjotError::Http(_)
            | VidjotError::Io(_)
            | VidjotError::NotFound(_)
            | VidjotError::Other(_) => kind(self.to_string()),
            other => other,
        }
    }

    /// Whether this error means the stored credential is gone and the user must log in again.
    pub fn is_auth(&self) -> bool {
        matches!(self, VidjotError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, VidjotError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "vidjot";
