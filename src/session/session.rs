//! One upload from local file to a processing video record

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{ApiClient, CreateVideo, VideoBackend, VideoRecord, VideoStatus};
use crate::config::Settings;
use crate::session::state::{SessionEvent, SessionState};
use crate::upload::{CancelHandle, HttpBlobSink, UploadCoordinator, UploadFile, UploadLimits};
use crate::{Result, VidjotError};

/// Runs upload sessions, one at a time.
///
/// [`Uploader::open_session`] borrows the uploader mutably for the lifetime
/// of the session, so a second session cannot be opened while one is alive.
pub struct Uploader {
    coordinator: UploadCoordinator,
    backend: Arc<dyn VideoBackend>,
}

impl Uploader {
    pub fn new(coordinator: UploadCoordinator, backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            coordinator,
            backend,
        }
    }

    /// Wire the coordinator to the real backend and storage over HTTP
    pub fn from_settings(settings: &Settings, client: ApiClient) -> Result<Self> {
        let backend: Arc<dyn VideoBackend> = Arc::new(client);
        let sink = Arc::new(HttpBlobSink::new(settings.request_timeout())?);
        let limits = UploadLimits {
            max_size_bytes: settings.max_upload_bytes(),
            chunk_size_bytes: settings.upload.chunk_size_bytes,
        };

        Ok(Self::new(
            UploadCoordinator::new(backend.clone(), sink, limits),
            backend,
        ))
    }

    /// Open a session for `file`, validating it before anything is sent.
    ///
    /// Returns the session together with the queue its events are published on.
    pub fn open_session(
        &mut self,
        file: UploadFile,
    ) -> Result<(UploadSession<'_>, mpsc::UnboundedReceiver<SessionEvent>)> {
        file.validate(self.coordinator.limits().max_size_bytes)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = UploadSession {
            uploader: self,
            file,
            state: SessionState::Idle,
            cancel: CancelHandle::new(),
            events: events_tx,
        };
        Ok((session, events_rx))
    }
}

/// A single upload: transfer, record creation, processing start
pub struct UploadSession<'a> {
    uploader: &'a mut Uploader,
    file: UploadFile,
    state: SessionState,
    cancel: CancelHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl UploadSession<'_> {
    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle for aborting the transfer from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Abort the transfer. `false` unless the session is uploading.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Drive the session to completion.
    ///
    /// The steps run strictly in order; a failure stops the session at the
    /// step that hit it. The returned record is the one processing was
    /// started for.
    pub async fn run(mut self) -> Result<VideoRecord> {
        let result = self.drive().await;

        match &result {
            Ok(record) => info!("Session for {} complete, video {}", self.file.name, record.id),
            Err(VidjotError::Cancelled) => self.transition(SessionState::Cancelled),
            Err(e) => {
                error!("Session for {} failed: {}", self.file.name, e);
                self.transition(SessionState::Error {
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn drive(&mut self) -> Result<VideoRecord> {
        let mut upload = self
            .uploader
            .coordinator
            .begin_with(self.file.clone(), self.cancel.clone())?;
        self.transition(SessionState::Uploading {
            filename: self.file.name.clone(),
        });

        while let Some(sample) = upload.next_progress().await {
            let _ = self.events.send(SessionEvent::Progress(sample));
        }
        let outcome = upload.finish().await?;

        let mut record = self
            .uploader
            .backend
            .create_video(&CreateVideo {
                filename: outcome.filename,
                storage_path: outcome.storage_path,
                duration_seconds: None,
            })
            .await
            .map_err(|e| e.reclassify(VidjotError::RecordCreation))?;
        self.transition(SessionState::RecordCreated {
            video_id: record.id.clone(),
        });

        let ack = self
            .uploader
            .backend
            .start_processing(&record.id)
            .await
            .map_err(|e| e.reclassify(VidjotError::ProcessingStart))?;
        if ack.already_processing() {
            warn!("Video {} was already processing", record.id);
        }
        record.status = ack.status.unwrap_or(VideoStatus::Processing);
        self.transition(SessionState::ProcessingStarted {
            video_id: record.id.clone(),
        });

        self.transition(SessionState::Complete {
            video_id: record.id.clone(),
        });
        Ok(record)
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(&next) {
            warn!("Ignoring session transition {} -> {}", self.state, next);
            return;
        }

        info!("Upload session: {} -> {}", self.state, next);
        self.state = next.clone();
        let _ = self.events.send(SessionEvent::State(next));
    }
}
