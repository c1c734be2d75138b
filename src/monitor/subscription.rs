//! Per-video progress subscriptions

use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{VideoRecord, VideoStatus};
use crate::config::Settings;
use crate::monitor::backoff::ReconnectPolicy;
use crate::monitor::channel::PushChannel;
use crate::monitor::events::{ProcessingStageEvent, PushFrame};
use crate::monitor::StatusSource;
use crate::{Result, VidjotError};

/// Health of the transport feeding a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening the push channel
    Connecting,
    /// Push channel open
    Connected,
    /// Push channel lost; reconnecting, or given up once retries ran out
    Disconnected,
    /// Following the record's status field by polling
    Polling,
    /// Finished; nothing more will be reported
    Closed,
}

/// Latest known status, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum LatestStatus {
    /// Nothing observed yet
    Awaiting,
    Pushed(ProcessingStageEvent),
    Polled(VideoStatus),
}

/// What a caller sees of one subscription, whichever transport is active
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub video_id: String,
    pub latest: LatestStatus,
    pub connection: ConnectionState,
    /// Consecutive push channel failures so far
    pub failed_attempts: u32,
}

impl MonitorSnapshot {
    fn new(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            latest: LatestStatus::Awaiting,
            connection: ConnectionState::Connecting,
            failed_attempts: 0,
        }
    }

    /// The pipeline reached `complete`/`failed` (or `ready`/`failed` by status)
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Final status once the pipeline is done
    pub fn outcome(&self) -> Option<VideoStatus> {
        match &self.latest {
            LatestStatus::Pushed(event) => match event.stage {
                crate::monitor::ProcessingStage::Complete => Some(VideoStatus::Ready),
                crate::monitor::ProcessingStage::Failed => Some(VideoStatus::Failed),
                _ => None,
            },
            LatestStatus::Polled(status) if status.is_terminal() => Some(*status),
            _ => None,
        }
    }

    pub fn stage_event(&self) -> Option<&ProcessingStageEvent> {
        match &self.latest {
            LatestStatus::Pushed(event) => Some(event),
            _ => None,
        }
    }
}

/// Tuning for push reconnects and the polling fallback
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Fall back to polling once push reconnects are exhausted
    pub poll_after_push_exhausted: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            reconnect: ReconnectPolicy::default(),
            poll_after_push_exhausted: true,
        }
    }
}

impl MonitorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            reconnect: ReconnectPolicy {
                base_delay: settings.retry_base(),
                max_retries: settings.monitor.max_retries,
            },
            poll_after_push_exhausted: settings.monitor.poll_after_push_exhausted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Push,
    Poll,
}

type Registry = Arc<Mutex<HashSet<String>>>;

/// Hands out progress subscriptions, at most one live per video
#[derive(Clone)]
pub struct ProgressMonitor {
    push: Arc<dyn PushChannel>,
    status: Arc<dyn StatusSource>,
    options: MonitorOptions,
    active: Registry,
}

impl ProgressMonitor {
    pub fn new(push: Arc<dyn PushChannel>, status: Arc<dyn StatusSource>, options: MonitorOptions) -> Self {
        Self {
            push,
            status,
            options,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Follow a video over the push channel
    pub fn subscribe(&self, video_id: &str) -> Result<Subscription> {
        self.spawn(video_id, Mode::Push)
    }

    /// Follow a video by polling its status field only
    pub fn subscribe_polling(&self, video_id: &str) -> Result<Subscription> {
        self.spawn(video_id, Mode::Poll)
    }

    /// Follow a record, without opening anything if it is already ready or failed
    pub fn subscribe_record(&self, record: &VideoRecord) -> Result<Subscription> {
        if record.status.is_terminal() {
            debug!("Video {} is already {}, not subscribing", record.id, record.status);
            let snapshot = MonitorSnapshot {
                video_id: record.id.clone(),
                latest: LatestStatus::Polled(record.status),
                connection: ConnectionState::Closed,
                failed_attempts: 0,
            };
            let (_tx, rx) = watch::channel(snapshot);
            return Ok(Subscription {
                video_id: record.id.clone(),
                state: rx,
                cancel: CancellationToken::new(),
                task: None,
                registry: None,
            });
        }

        self.subscribe(&record.id)
    }

    fn spawn(&self, video_id: &str, mode: Mode) -> Result<Subscription> {
        {
            let mut active = lock(&self.active);
            if !active.insert(video_id.to_string()) {
                return Err(VidjotError::AlreadySubscribed(video_id.to_string()));
            }
        }

        let (tx, rx) = watch::channel(MonitorSnapshot::new(video_id));
        let driver = Driver {
            video_id: video_id.to_string(),
            push: self.push.clone(),
            status: self.status.clone(),
            options: self.options,
            state: tx,
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = video_id.to_string();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Subscription for {} closed", id),
                _ = driver.run(mode) => {}
            }
        });

        info!("Watching video {} ({:?})", video_id, mode);
        Ok(Subscription {
            video_id: video_id.to_string(),
            state: rx,
            cancel,
            task: Some(task),
            registry: Some(self.active.clone()),
        })
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashSet<String>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A live view of one video's pipeline. Dropping it tears the connection down.
#[derive(Debug)]
pub struct Subscription {
    video_id: String,
    state: watch::Receiver<MonitorSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    registry: Option<Registry>,
}

impl Subscription {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.borrow().clone()
    }

    /// Wait for the next update; `None` once the subscription stopped reporting
    pub async fn changed(&mut self) -> Option<MonitorSnapshot> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until the pipeline finishes. `None` if monitoring stopped first.
    pub async fn wait_terminal(&mut self) -> Option<MonitorSnapshot> {
        loop {
            {
                let snapshot = self.state.borrow_and_update();
                if snapshot.is_terminal() {
                    return Some(snapshot.clone());
                }
            }

            if self.state.changed().await.is_err() {
                let snapshot = self.state.borrow();
                return snapshot.is_terminal().then(|| snapshot.clone());
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(registry) = &self.registry {
            lock(registry).remove(&self.video_id);
        }
    }
}

enum StreamEnd {
    Terminal,
    Failed { error: VidjotError, healthy: bool },
}

enum PushEnd {
    Terminal,
    Exhausted,
}

/// Background task behind one subscription
struct Driver {
    video_id: String,
    push: Arc<dyn PushChannel>,
    status: Arc<dyn StatusSource>,
    options: MonitorOptions,
    state: watch::Sender<MonitorSnapshot>,
}

impl Driver {
    async fn run(self, mode: Mode) {
        match mode {
            Mode::Push => match self.run_push().await {
                PushEnd::Terminal => self.set_connection(ConnectionState::Closed),
                PushEnd::Exhausted if self.options.poll_after_push_exhausted => {
                    info!("Falling back to polling for video {}", self.video_id);
                    self.run_poll().await;
                }
                PushEnd::Exhausted => {}
            },
            Mode::Poll => self.run_poll().await,
        }
    }

    async fn run_push(&self) -> PushEnd {
        let policy = self.options.reconnect;
        let mut failures = 0u32;

        loop {
            self.set_connection(ConnectionState::Connecting);

            match self.stream_once(failures > 0).await {
                StreamEnd::Terminal => return PushEnd::Terminal,
                StreamEnd::Failed { error, healthy } => {
                    if healthy {
                        failures = 0;
                    }
                    failures += 1;
                    self.state.send_modify(|s| {
                        s.connection = ConnectionState::Disconnected;
                        s.failed_attempts = failures;
                    });

                    if !policy.allows(failures) {
                        warn!(
                            "Progress stream for {} failed {} times in a row, giving up: {}",
                            self.video_id, failures, error
                        );
                        return PushEnd::Exhausted;
                    }

                    let delay = policy.delay_for(failures);
                    warn!(
                        "Progress stream for {} dropped ({}), reconnecting in {:?} (attempt {}/{})",
                        self.video_id, error, delay, failures, policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One connection: read frames until a terminal event or an error.
    ///
    /// A reopened stream may have missed the terminal event, and the backend
    /// drops stored progress shortly after it, so `recheck` asks the record
    /// itself before trusting the new stream.
    async fn stream_once(&self, recheck: bool) -> StreamEnd {
        let mut frames = match self.push.open(&self.video_id).await {
            Ok(frames) => frames,
            Err(error) => {
                return StreamEnd::Failed {
                    error,
                    healthy: false,
                }
            }
        };
        self.set_connection(ConnectionState::Connected);

        if recheck && self.finished_meanwhile().await {
            drop(frames);
            return StreamEnd::Terminal;
        }

        let mut healthy = false;
        while let Some(frame) = frames.next().await {
            let payload = match frame {
                Ok(payload) => payload,
                Err(error) => return StreamEnd::Failed { error, healthy },
            };

            match PushFrame::decode(&payload) {
                Ok(PushFrame::Progress(event)) => {
                    healthy = true;
                    debug!(
                        "Video {}: {} {}% {}",
                        self.video_id, event.stage, event.percent, event.message
                    );
                    if event.stage.is_terminal() {
                        self.publish(LatestStatus::Pushed(event));
                        drop(frames);
                        return StreamEnd::Terminal;
                    }
                    self.publish(LatestStatus::Pushed(event));
                }
                Ok(PushFrame::Connected) => {
                    healthy = true;
                    self.set_connection(ConnectionState::Connected);
                }
                Ok(PushFrame::Keepalive) => healthy = true,
                Ok(PushFrame::Unknown(kind)) => {
                    debug!("Ignoring '{}' frame for {}", kind, self.video_id)
                }
                Err(e) => warn!("Ignoring progress payload for {}: {}", self.video_id, e),
            }
        }

        StreamEnd::Failed {
            error: VidjotError::Channel("stream closed before the pipeline finished".to_string()),
            healthy,
        }
    }

    async fn finished_meanwhile(&self) -> bool {
        match self.status.fetch_status(&self.video_id).await {
            Ok(status) if status.is_terminal() => {
                info!("Video {} finished as {} while reconnecting", self.video_id, status);
                self.publish(LatestStatus::Polled(status));
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Could not check status of {} after reconnect: {}", self.video_id, e);
                false
            }
        }
    }

    async fn run_poll(&self) {
        self.set_connection(ConnectionState::Polling);

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.status.fetch_status(&self.video_id).await {
                Ok(status) => {
                    debug!("Video {} polled as {}", self.video_id, status);
                    self.publish(LatestStatus::Polled(status));
                    if status.is_terminal() {
                        self.set_connection(ConnectionState::Closed);
                        return;
                    }
                }
                Err(e) if e.is_auth() => {
                    error!("Stopped polling {}: {}", self.video_id, e);
                    self.set_connection(ConnectionState::Closed);
                    return;
                }
                Err(e) => warn!("Polling {} failed: {}", self.video_id, e),
            }
        }
    }

    /// Replace the cached status unless the pipeline already finished
    fn publish(&self, latest: LatestStatus) {
        self.state.send_if_modified(|s| {
            if s.is_terminal() || s.latest == latest {
                return false;
            }
            s.latest = latest;
            true
        });
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.state.send_if_modified(|s| {
            if s.connection == connection {
                return false;
            }
            s.connection = connection;
            true
        });
    }
}
