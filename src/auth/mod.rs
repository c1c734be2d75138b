//! Authentication state for vidjot
//!
//! Keeps the bearer token used by every backend call except `/auth`.

mod credentials;

pub use credentials::CredentialStore;
