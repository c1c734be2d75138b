//! Upload session state machine

use serde::Serialize;

use crate::upload::UploadProgressSample;

/// Where an upload session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing started yet
    Idle,

    /// File bytes are moving to storage
    Uploading { filename: String },

    /// The backend knows about the uploaded file
    RecordCreated { video_id: String },

    /// The AI pipeline was asked to start
    ProcessingStarted { video_id: String },

    /// Upload handed off; pipeline progress is followed separately
    Complete { video_id: String },

    /// The user aborted the transfer
    Cancelled,

    /// A step failed; nothing after it ran
    Error { message: String },
}

impl SessionState {
    /// Short lowercase name for display and logs
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Uploading { .. } => "uploading",
            SessionState::RecordCreated { .. } => "record created",
            SessionState::ProcessingStarted { .. } => "processing started",
            SessionState::Complete { .. } => "complete",
            SessionState::Cancelled => "cancelled",
            SessionState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete { .. } | SessionState::Cancelled | SessionState::Error { .. }
        )
    }

    /// Only a running transfer can be cancelled
    pub fn can_cancel(&self) -> bool {
        matches!(self, SessionState::Uploading { .. })
    }

    /// Video id once a record exists
    pub fn video_id(&self) -> Option<&str> {
        match self {
            SessionState::RecordCreated { video_id }
            | SessionState::ProcessingStarted { video_id }
            | SessionState::Complete { video_id } => Some(video_id),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Uploading { .. }) => true,
            (Uploading { .. }, RecordCreated { .. } | Cancelled) => true,
            (RecordCreated { .. }, ProcessingStarted { .. }) => true,
            (ProcessingStarted { .. }, Complete { .. }) => true,
            (Idle, Error { .. }) => false,
            (from, Error { .. }) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Published on a session's event queue, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    State(SessionState),
    Progress(UploadProgressSample),
}
