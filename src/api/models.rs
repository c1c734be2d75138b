//! Wire types exchanged with the video journal backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Server-side status of a video record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// Uploaded, processing not started yet
    Pending,
    /// AI pipeline running
    Processing,
    /// Transcript, title, summary and tags available
    Ready,
    /// Pipeline failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// No further pipeline progress will be reported once a video is here
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A video journal entry as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,

    pub filename: String,

    pub storage_path: String,

    /// Short-lived signed URL for playback
    #[serde(default)]
    pub storage_url: Option<String>,

    /// AI generated title
    #[serde(default)]
    pub title: Option<String>,

    /// Tags in first-seen order, without duplicates
    #[serde(default, deserialize_with = "deserialize_tag_set")]
    pub tags: Vec<String>,

    /// Absent from list responses
    #[serde(default)]
    pub transcript: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default, rename = "duration")]
    pub duration_seconds: Option<f64>,

    #[serde(default = "default_status")]
    pub status: VideoStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Title if the pipeline produced one, otherwise the uploaded file name
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.filename)
    }
}

fn default_status() -> VideoStatus {
    VideoStatus::Pending
}

fn deserialize_tag_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.unwrap_or_default() {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Response of `GET /videos`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoList {
    pub videos: Vec<VideoRecord>,
    pub total: usize,
}

/// Filters accepted by `GET /videos`
#[derive(Debug, Clone, Default)]
pub struct VideoFilter {
    pub status: Option<VideoStatus>,
    pub tag: Option<String>,
    pub limit: Option<u32>,
}

/// Response of `GET /videos/tags`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    pub tags: Vec<String>,
}

/// Body of `POST /videos`, sent once the raw file has landed in storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVideo {
    pub filename: String,
    pub storage_path: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "duration")]
    pub duration_seconds: Option<f64>,
}

/// Response of `POST /videos/{id}/process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAck {
    pub message: String,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub status: Option<VideoStatus>,
}

impl ProcessAck {
    /// The backend declined to restart a pipeline that is already running
    pub fn already_processing(&self) -> bool {
        self.video_id.is_none() && self.status == Some(VideoStatus::Processing)
    }
}

/// Response of `DELETE /videos/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAck {
    pub message: String,
    #[serde(default)]
    pub video_id: Option<String>,
}

/// Body of the upload-ticket request
#[derive(Debug, Clone, Serialize)]
pub struct TicketRequest<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
}

/// Short-lived destination authorizing one direct write to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    #[serde(rename = "upload_url")]
    pub destination_url: String,
    pub storage_path: String,
    pub content_type: String,
}

/// Body of `POST /auth`
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    pub password: &'a str,
}

/// Response of `POST /auth`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
}

/// FastAPI style error body
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}
