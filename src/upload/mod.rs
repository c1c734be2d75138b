//! Upload module for vidjot
//!
//! Streams one local video at a time to a pre-signed storage URL, reporting
//! byte-level progress and supporting cancellation.

mod coordinator;
mod file;
mod progress;
mod sink;

pub use coordinator::{CancelHandle, UploadCoordinator, UploadHandle, UploadLimits, UploadOutcome};
pub use file::{content_type_for, format_bytes, UploadFile};
pub use progress::UploadProgressSample;
pub use sink::{BlobSink, ByteStream, HttpBlobSink};
