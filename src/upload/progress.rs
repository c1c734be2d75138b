use serde::Serialize;

/// Byte-level progress of one upload transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadProgressSample {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// 0.0 - 100.0; 0 when the total size is unknown or zero
    pub percent: f64,
}

impl UploadProgressSample {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            (bytes_transferred as f64 / total_bytes as f64 * 100.0).clamp(0.0, 100.0)
        };

        Self {
            bytes_transferred,
            total_bytes,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.bytes_transferred >= self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(UploadProgressSample::new(50, 200).percent, 25.0);
        assert_eq!(UploadProgressSample::new(300, 200).percent, 100.0);
    }

    #[test]
    fn unknown_total_reads_as_zero_percent() {
        let sample = UploadProgressSample::new(4096, 0);
        assert_eq!(sample.percent, 0.0);
        assert!(!sample.is_complete());
    }
}
