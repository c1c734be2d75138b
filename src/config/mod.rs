//! Configuration module for vidjot
//!
//! Handles loading and managing application settings from TOML files.

mod settings;

pub use settings::{Settings, MAX_UPLOAD_BYTES};
