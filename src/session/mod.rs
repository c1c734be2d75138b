//! Upload session module for vidjot
//!
//! Sequences one upload: transfer, record creation, processing start.

#[allow(clippy::module_inception)]
mod session;
mod state;

pub use session::{UploadSession, Uploader};
pub use state::{SessionEvent, SessionState};
