//! Processing progress: server push with bounded reconnects, polling as fallback

pub mod backoff;
pub mod channel;
pub mod events;
pub mod sse;
pub mod subscription;

use async_trait::async_trait;

use crate::api::VideoStatus;
use crate::Result;

pub use backoff::ReconnectPolicy;
pub use channel::{FrameStream, HttpPushChannel, PushChannel};
pub use events::{ProcessingStage, ProcessingStageEvent, PushFrame};
pub use subscription::{
    ConnectionState, LatestStatus, MonitorOptions, MonitorSnapshot, ProgressMonitor, Subscription,
};

/// Reads a video's coarse status field, used when push is unavailable
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, video_id: &str) -> Result<VideoStatus>;
}
