//! Pipeline stage events pushed by the backend

use serde::{Deserialize, Serialize};

use crate::{Result, VidjotError};

/// Named phase of the server-side AI pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Queued,
    Downloading,
    Transcoding,
    Transcribing,
    Generating,
    Complete,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Transcoding => "transcoding",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// No events follow a terminal stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Point-in-time snapshot of a video's pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStageEvent {
    pub stage: ProcessingStage,
    pub message: String,
    /// Progress within the whole pipeline, 0 - 100
    pub percent: u8,
}

/// One decoded frame of the progress stream
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Progress(ProcessingStageEvent),
    /// Acknowledgment sent when the stream opens
    Connected,
    /// Sent by the backend after 30s of silence
    Keepalive,
    /// A frame type this client does not know about
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    stage: Option<ProcessingStage>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    percent: Option<f64>,
}

impl PushFrame {
    /// Decode the JSON payload of one `data:` frame
    pub fn decode(payload: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(payload)
            .map_err(|e| VidjotError::Channel(format!("malformed payload: {}", e)))?;

        match raw.kind.as_str() {
            "progress" => {
                let stage = raw.stage.ok_or_else(|| {
                    VidjotError::Channel("progress payload without a stage".to_string())
                })?;
                let percent = raw.percent.unwrap_or(0.0);
                if !percent.is_finite() {
                    return Err(VidjotError::Channel(format!(
                        "progress payload with invalid percent {}",
                        percent
                    )));
                }

                Ok(PushFrame::Progress(ProcessingStageEvent {
                    stage,
                    message: raw.message.unwrap_or_default(),
                    percent: percent.round().clamp(0.0, 100.0) as u8,
                }))
            }
            "connected" => Ok(PushFrame::Connected),
            "keepalive" => Ok(PushFrame::Keepalive),
            other => Ok(PushFrame::Unknown(other.to_string())),
        }
    }
}
