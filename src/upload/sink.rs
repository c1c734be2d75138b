//! Destination side of an upload transfer

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::api::UploadTicket;
use crate::{Result, VidjotError};

/// File contents handed to a sink, one chunk at a time
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Writes the raw bytes of an upload to the ticket's destination
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Consume `body` and resolve once the destination acknowledged it
    async fn put(&self, ticket: &UploadTicket, body: ByteStream, content_length: u64) -> Result<()>;
}

/// Streams uploads to pre-signed storage URLs with an HTTP PUT
#[derive(Clone, Debug)]
pub struct HttpBlobSink {
    http: Client,
}

impl HttpBlobSink {
    /// Transfers may run for a long time, so only connecting is bounded
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| VidjotError::Config(format!("Failed to build upload client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl BlobSink for HttpBlobSink {
    async fn put(&self, ticket: &UploadTicket, body: ByteStream, content_length: u64) -> Result<()> {
        debug!(
            "PUT {} bytes to storage path {}",
            content_length, ticket.storage_path
        );

        // The signed URL already authorizes the write; no bearer token here.
        let response = self
            .http
            .put(&ticket.destination_url)
            .header(CONTENT_TYPE, &ticket.content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| VidjotError::Transfer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VidjotError::Transfer(format!(
                "storage answered {}{}",
                status,
                if detail.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", detail.trim())
                }
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn ticket_for(server: &mockito::Server) -> UploadTicket {
        UploadTicket {
            destination_url: format!("{}/bucket/videos/beach.mp4?sig=abc", server.url()),
            storage_path: "videos/beach.mp4".to_string(),
            content_type: "video/mp4".to_string(),
        }
    }

    fn body(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn puts_raw_body_with_ticket_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/bucket/videos/beach.mp4")
            .match_query(mockito::Matcher::UrlEncoded("sig".into(), "abc".into()))
            .match_header("content-type", "video/mp4")
            .match_header("authorization", mockito::Matcher::Missing)
            .match_body("hello world")
            .with_status(200)
            .create_async()
            .await;

        let sink = HttpBlobSink::new(Duration::from_secs(5)).expect("sink");
        sink.put(&ticket_for(&server), body(vec![b"hello ", b"world"]), 11)
            .await
            .expect("upload succeeds");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_transfer_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/bucket/videos/beach.mp4")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body("SignatureDoesNotMatch")
            .create_async()
            .await;

        let sink = HttpBlobSink::new(Duration::from_secs(5)).expect("sink");
        let err = sink
            .put(&ticket_for(&server), body(vec![b"data"]), 4)
            .await
            .expect_err("403 must fail");

        match err {
            VidjotError::Transfer(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("SignatureDoesNotMatch"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
