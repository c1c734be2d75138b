//! Upload coordinator: ticket, streamed transfer, progress and cancellation

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::VideoBackend;
use crate::upload::file::UploadFile;
use crate::upload::progress::UploadProgressSample;
use crate::upload::sink::{BlobSink, ByteStream};
use crate::{Result, VidjotError};

/// Where an upload landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub storage_path: String,
    pub filename: String,
}

/// Limits applied before an upload starts
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_size_bytes: u64,
    pub chunk_size_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: crate::config::MAX_UPLOAD_BYTES,
            chunk_size_bytes: 256 * 1024,
        }
    }
}

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;
const CANCELLED: u8 = 2;
const SETTLED: u8 = 3;

#[derive(Debug)]
struct TransferGuard {
    state: AtomicU8,
    token: CancellationToken,
}

/// Aborts an in-flight transfer.
///
/// Cancelling and settling race through one atomic, so exactly one of them
/// decides how the transfer ends.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    guard: Arc<TransferGuard>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            guard: Arc::new(TransferGuard {
                state: AtomicU8::new(IDLE),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Abort the transfer. Returns `true` only if a live transfer was interrupted.
    pub fn cancel(&self) -> bool {
        let interrupted = self
            .guard
            .state
            .compare_exchange(ACTIVE, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if interrupted {
            self.guard.token.cancel();
            info!("Upload cancelled by user");
        }
        interrupted
    }

    /// Whether a transfer is currently running and can be cancelled
    pub fn is_active(&self) -> bool {
        self.guard.state.load(Ordering::Acquire) == ACTIVE
    }

    fn activate(&self) -> Result<()> {
        self.guard
            .state
            .compare_exchange(IDLE, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| VidjotError::Other("cancel handle already used for a transfer".to_string()))
    }

    /// Record the transfer's own result unless a cancel got there first
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        match self.guard.state.compare_exchange(
            ACTIVE,
            SETTLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => result,
            Err(_) => Err(VidjotError::Cancelled),
        }
    }

    fn token(&self) -> CancellationToken {
        self.guard.token.clone()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A running upload: progress samples, the eventual result, and cancellation
#[derive(Debug)]
pub struct UploadHandle {
    progress: mpsc::UnboundedReceiver<UploadProgressSample>,
    task: JoinHandle<Result<UploadOutcome>>,
    cancel: CancelHandle,
}

impl UploadHandle {
    /// Next progress sample; `None` once the transfer stopped producing them
    pub async fn next_progress(&mut self) -> Option<UploadProgressSample> {
        self.progress.recv().await
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the transfer to resolve
    pub async fn finish(self) -> Result<UploadOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(VidjotError::Cancelled),
            Err(e) => Err(VidjotError::Transfer(format!("upload task failed: {}", e))),
        }
    }
}

/// Moves one local file to storage through a pre-signed URL
#[derive(Clone)]
pub struct UploadCoordinator {
    backend: Arc<dyn VideoBackend>,
    sink: Arc<dyn BlobSink>,
    limits: UploadLimits,
}

impl UploadCoordinator {
    pub fn new(backend: Arc<dyn VideoBackend>, sink: Arc<dyn BlobSink>, limits: UploadLimits) -> Self {
        Self {
            backend,
            sink,
            limits,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Start uploading `file`.
    ///
    /// Validation failures are returned immediately without touching the
    /// network. Must be called from within a tokio runtime.
    pub fn begin(&self, file: UploadFile) -> Result<UploadHandle> {
        self.begin_with(file, CancelHandle::new())
    }

    /// Start uploading `file`, aborting through a handle the caller already holds
    pub fn begin_with(&self, file: UploadFile, cancel: CancelHandle) -> Result<UploadHandle> {
        file.validate(self.limits.max_size_bytes)?;
        cancel.activate()?;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let sink = self.sink.clone();
        let chunk_size = self.limits.chunk_size_bytes.max(1);
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let token = task_cancel.token();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(VidjotError::Cancelled),
                result = transfer(backend, sink, file, chunk_size, progress_tx) => result,
            };
            task_cancel.settle(result)
        });

        Ok(UploadHandle {
            progress: progress_rx,
            task,
            cancel,
        })
    }
}

async fn transfer(
    backend: Arc<dyn VideoBackend>,
    sink: Arc<dyn BlobSink>,
    file: UploadFile,
    chunk_size: usize,
    progress_tx: mpsc::UnboundedSender<UploadProgressSample>,
) -> Result<UploadOutcome> {
    let ticket = backend
        .request_upload_ticket(&file.name, &file.content_type)
        .await
        .map_err(|e| e.reclassify(VidjotError::Ticket))?;

    debug!("Got upload ticket for {} -> {}", file.name, ticket.storage_path);

    let handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(|e| VidjotError::Transfer(format!("cannot open {}: {}", file.path.display(), e)))?;

    let total = file.size;
    let sent = Arc::new(AtomicU64::new(0));
    let _ = progress_tx.send(UploadProgressSample::new(0, total));

    let counter = sent.clone();
    let body: ByteStream = Box::pin(ReaderStream::with_capacity(handle, chunk_size).map(
        move |chunk| {
            if let Ok(bytes) = &chunk {
                let so_far = counter.fetch_add(bytes.len() as u64, Ordering::AcqRel)
                    + bytes.len() as u64;
                let _ = progress_tx.send(UploadProgressSample::new(so_far, total));
            }
            chunk
        },
    ));

    info!("Uploading {} ({} bytes)", file.name, total);

    sink.put(&ticket, body, total)
        .await
        .map_err(|e| e.reclassify(VidjotError::Transfer))?;

    let transferred = sent.load(Ordering::Acquire);
    if transferred != total {
        warn!(
            "Transfer of {} stopped at {} of {} bytes",
            file.name, transferred, total
        );
        return Err(VidjotError::Transfer(format!(
            "transfer ended after {} of {} bytes",
            transferred, total
        )));
    }

    info!("Upload of {} finished", file.name);
    Ok(UploadOutcome {
        storage_path: ticket.storage_path,
        filename: file.name,
    })
}
