//! Local files selected for upload

use std::path::{Path, PathBuf};

use crate::{Result, VidjotError};

/// Content type reported for extensions we do not recognise
const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// A local file selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Location on disk
    pub path: PathBuf,

    /// Display name sent to the backend
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// Media type, derived from the extension
    pub content_type: String,
}

impl UploadFile {
    pub fn new(path: PathBuf, name: String, size: u64, content_type: String) -> Self {
        Self {
            path,
            name,
            size,
            content_type,
        }
    }

    /// Describe a file on disk, reading its size from the filesystem
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            VidjotError::Validation(format!("cannot read {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(VidjotError::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                VidjotError::Validation(format!("{} has no usable file name", path.display()))
            })?;

        Ok(Self::new(
            path.to_path_buf(),
            name,
            metadata.len(),
            content_type_for(path).to_string(),
        ))
    }

    /// Check the media type and size ceiling. Runs before any network call.
    pub fn validate(&self, max_size: u64) -> Result<()> {
        if !self.content_type.starts_with("video/") {
            return Err(VidjotError::Validation(format!(
                "{} is not a video (detected type {})",
                self.name, self.content_type
            )));
        }

        if self.size > max_size {
            return Err(VidjotError::Validation(format!(
                "{} is {}, larger than the {} limit",
                self.name,
                format_bytes(self.size),
                format_bytes(max_size)
            )));
        }

        Ok(())
    }
}

/// Guess a media type from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("ogv") => "video/ogg",
        Some("3gp") => "video/3gpp",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        _ => UNKNOWN_CONTENT_TYPE,
    }
}

/// Human readable byte count (binary units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
