//! Transport client for the video journal backend
//!
//! Stateless request/response calls. The [`VideoBackend`] trait is the seam
//! the upload coordinator and session state machine depend on.

mod client;
mod models;

use async_trait::async_trait;

use crate::Result;

pub use client::ApiClient;
pub use models::{
    CreateVideo, DeleteAck, ProcessAck, TagList, UploadTicket, VideoFilter, VideoList,
    VideoRecord, VideoStatus,
};

/// Backend calls made during one upload session, in the order they happen
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Obtain a short-lived destination for one direct write to storage
    async fn request_upload_ticket(&self, filename: &str, content_type: &str) -> Result<UploadTicket>;

    /// Register a video whose bytes are already in storage
    async fn create_video(&self, video: &CreateVideo) -> Result<VideoRecord>;

    /// Kick off the AI pipeline for a record
    async fn start_processing(&self, video_id: &str) -> Result<ProcessAck>;
}
