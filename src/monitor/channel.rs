//! Server-push progress channel

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::monitor::sse::SseDecoder;
use crate::{Result, VidjotError};

/// Event payloads of one open push connection, in arrival order
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Opens the backend's server-push progress stream for a video
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn open(&self, video_id: &str) -> Result<FrameStream>;
}

/// Reads `GET /videos/{id}/progress` as a text event stream.
///
/// The backend exempts this endpoint from bearer auth and browsers cannot
/// attach headers to it, so no token is sent.
#[derive(Clone, Debug)]
pub struct HttpPushChannel {
    http: Client,
    base_url: String,
}

impl HttpPushChannel {
    /// The stream stays open indefinitely, so only connecting is bounded
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| VidjotError::Config(format!("Failed to build stream client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn progress_url(&self, video_id: &str) -> String {
        format!("{}/videos/{}/progress", self.base_url, video_id)
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn open(&self, video_id: &str) -> Result<FrameStream> {
        let response = self
            .http
            .get(self.progress_url(video_id))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| VidjotError::Channel(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VidjotError::Channel(format!(
                "progress stream answered {}",
                status
            )));
        }

        debug!("Progress stream open for {}", video_id);

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(VidjotError::Channel(e.to_string()))],
            })
            .flat_map(stream::iter);

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_data_payloads_without_auth_header() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/v1/progress")
            .match_header("accept", "text/event-stream")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(
                "data: {\"type\": \"connected\", \"video_id\": \"v1\"}\n\n\
                 data: {\"type\": \"progress\", \"stage\": \"queued\", \"message\": \"Starting processing...\", \"percent\": 0}\n\n",
            )
            .create_async()
            .await;

        let channel = HttpPushChannel::new(&server.url(), Duration::from_secs(5)).expect("channel");
        let frames: Vec<String> = channel
            .open("v1")
            .await
            .expect("open")
            .map(|frame| frame.expect("frame"))
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("connected"));
        assert!(frames[1].contains("queued"));
    }

    #[tokio::test]
    async fn error_status_fails_to_open() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/v1/progress")
            .with_status(502)
            .create_async()
            .await;

        let channel = HttpPushChannel::new(&server.url(), Duration::from_secs(5)).expect("channel");
        let err = match channel.open("v1").await {
            Ok(_) => panic!("502 must not open"),
            Err(e) => e,
        };

        assert!(matches!(err, VidjotError::Channel(_)));
    }
}
