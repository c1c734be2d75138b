//! In-memory stand-ins for the backend, storage and progress channels

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::api::{CreateVideo, ProcessAck, UploadTicket, VideoBackend, VideoRecord, VideoStatus};
use crate::monitor::{FrameStream, PushChannel, StatusSource};
use crate::upload::{BlobSink, ByteStream};
use crate::{Result, VidjotError};

/// Backend that records every call and can be told to fail or stall
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
    ticket_error: Mutex<Option<VidjotError>>,
    create_error: Mutex<Option<VidjotError>>,
    process_error: Mutex<Option<VidjotError>>,
    latency: Option<Duration>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn fail_ticket(&self, error: VidjotError) {
        *self.ticket_error.lock().unwrap() = Some(error);
    }

    pub fn fail_create(&self, error: VidjotError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    pub fn fail_process(&self, error: VidjotError) {
        *self.process_error.lock().unwrap() = Some(error);
    }

    /// Call log, e.g. `["ticket holiday.mp4", "create videos/holiday.mp4", "process vid-1"]`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ticket_requests(&self) -> Vec<String> {
        self.calls_named("ticket")
    }

    pub fn create_requests(&self) -> Vec<String> {
        self.calls_named("create")
    }

    pub fn process_requests(&self) -> Vec<String> {
        self.calls_named("process")
    }

    fn calls_named(&self, name: &str) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.strip_prefix(name))
            .map(|arg| arg.trim().to_string())
            .collect()
    }

    async fn answer(&self, call: String, failure: &Mutex<Option<VidjotError>>) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().unwrap().push(call);
        match failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VideoBackend for FakeBackend {
    async fn request_upload_ticket(&self, filename: &str, content_type: &str) -> Result<UploadTicket> {
        self.answer(format!("ticket {}", filename), &self.ticket_error)
            .await?;
        Ok(UploadTicket {
            destination_url: format!("memory://bucket/videos/{}", filename),
            storage_path: format!("videos/{}", filename),
            content_type: content_type.to_string(),
        })
    }

    async fn create_video(&self, video: &CreateVideo) -> Result<VideoRecord> {
        self.answer(format!("create {}", video.storage_path), &self.create_error)
            .await?;
        Ok(VideoRecord {
            id: "vid-1".to_string(),
            filename: video.filename.clone(),
            storage_path: video.storage_path.clone(),
            storage_url: None,
            title: None,
            tags: Vec::new(),
            transcript: None,
            summary: None,
            duration_seconds: video.duration_seconds,
            status: VideoStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
        })
    }

    async fn start_processing(&self, video_id: &str) -> Result<ProcessAck> {
        self.answer(format!("process {}", video_id), &self.process_error)
            .await?;
        Ok(ProcessAck {
            message: "Processing started".to_string(),
            video_id: Some(video_id.to_string()),
            status: Some(VideoStatus::Processing),
        })
    }
}

/// Storage that counts the bytes it is sent
#[derive(Default)]
pub struct MemorySink {
    received: AtomicU64,
    error: Mutex<Option<VidjotError>>,
    stop_after: Option<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the write without reading the body
    pub fn failing(error: VidjotError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    /// Stops reading once `bytes` arrived and reports success anyway
    pub fn truncating(bytes: u64) -> Self {
        Self {
            stop_after: Some(bytes),
            ..Self::default()
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BlobSink for MemorySink {
    async fn put(&self, _ticket: &UploadTicket, mut body: ByteStream, _content_length: u64) -> Result<()> {
        if let Some(error) = self.error.lock().unwrap().take() {
            return Err(error);
        }

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let total = self.received.fetch_add(chunk.len() as u64, Ordering::AcqRel) + chunk.len() as u64;
            if self.stop_after.is_some_and(|limit| total >= limit) {
                break;
            }
        }
        Ok(())
    }
}

/// Storage that reads part of the body and then never answers
pub struct GatedSink {
    received: AtomicU64,
    stall_at: u64,
}

impl GatedSink {
    pub fn stall_after(bytes: u64) -> Self {
        Self {
            received: AtomicU64::new(0),
            stall_at: bytes,
        }
    }
}

#[async_trait]
impl BlobSink for GatedSink {
    async fn put(&self, _ticket: &UploadTicket, mut body: ByteStream, _content_length: u64) -> Result<()> {
        while self.received.load(Ordering::Acquire) < self.stall_at {
            match body.next().await {
                Some(chunk) => {
                    self.received.fetch_add(chunk?.len() as u64, Ordering::AcqRel);
                }
                None => return Ok(()),
            }
        }
        futures::future::pending::<()>().await;
        Ok(())
    }
}

struct Connection {
    frames: Vec<Result<String>>,
    stay_open: bool,
}

/// Push channel that replays scripted connections, refusing once they run out
#[derive(Default)]
pub struct ScriptedPush {
    script: Mutex<VecDeque<Connection>>,
    opened_at: Mutex<Vec<Instant>>,
}

impl ScriptedPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next connection; it ends after its frames unless kept open
    pub fn connection(&self, frames: Vec<Result<String>>) -> &Self {
        self.script.lock().unwrap().push_back(Connection {
            frames,
            stay_open: false,
        });
        self
    }

    /// Keep the most recently scripted connection open after its frames
    pub fn stay_open(&self) -> &Self {
        if let Some(last) = self.script.lock().unwrap().back_mut() {
            last.stay_open = true;
        }
        self
    }

    pub fn opens(&self) -> usize {
        self.opened_at.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opened_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushChannel for ScriptedPush {
    async fn open(&self, _video_id: &str) -> Result<FrameStream> {
        self.opened_at.lock().unwrap().push(Instant::now());

        let connection = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| VidjotError::Channel("connection refused".to_string()))?;

        let frames = stream::iter(connection.frames);
        if connection.stay_open {
            Ok(frames.chain(stream::pending()).boxed())
        } else {
            Ok(frames.boxed())
        }
    }
}

/// Status source answering from a queue; `processing` once the queue is empty
pub struct ScriptedStatus {
    answers: Mutex<VecDeque<Result<VideoStatus>>>,
    called_at: Mutex<Vec<Instant>>,
}

impl ScriptedStatus {
    pub fn new(answers: Vec<Result<VideoStatus>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            called_at: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.called_at.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.called_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn fetch_status(&self, _video_id: &str) -> Result<VideoStatus> {
        self.called_at.lock().unwrap().push(Instant::now());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(VideoStatus::Processing))
    }
}
