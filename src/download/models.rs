//! Data structures for the transfer engine
//!
//! Byte-level progress, the result of a single transfer and the errors a transfer
//! can fail with.

use std::{fmt, io, time::Duration};
use thiserror::Error;

use crate::util::percentage;

/// Represents the progress of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Total size of the transfer in bytes (if the server reported it)
    pub total_size: Option<u64>,
    /// Number of bytes written so far
    pub downloaded: u64,
}

impl Progress {
    /// Integer percentage, `None` if the total size is unknown
    pub fn percentage(&self) -> Option<u8> {
        percentage(self.downloaded, self.total_size)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_size {
            Some(total) => write!(
                f,
                "{} / {}",
                bytesize::ByteSize::b(self.downloaded),
                bytesize::ByteSize::b(total)
            ),
            None => write!(f, "{}", bytesize::ByteSize::b(self.downloaded)),
        }
    }
}

/// How a transfer that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every byte was written to the destination
    Completed(Progress),
    /// Cancellation was observed; whatever was written stays on disk
    Cancelled(Progress),
}

impl TransferOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn progress(&self) -> Progress {
        match self {
            Self::Completed(progress) | Self::Cancelled(progress) => *progress,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP error: {status} for {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    /// The body stream broke after some bytes were already written
    #[error("Download failed after {bytes_downloaded} bytes: {source}")]
    Interrupted {
        bytes_downloaded: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("Transfer stalled: no data received for {0:?}")]
    Stalled(Duration),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = Progress {
            total_size: Some(1_000),
            downloaded: 250,
        };
        assert_eq!(progress.percentage(), Some(25));

        let unknown = Progress {
            total_size: None,
            downloaded: 250,
        };
        assert_eq!(unknown.percentage(), None);
    }

    #[test]
    fn test_progress_display() {
        let progress = Progress {
            total_size: Some(2_000),
            downloaded: 1_000,
        };
        assert!(progress.to_string().contains('/'));

        let unknown = Progress {
            total_size: None,
            downloaded: 1_000,
        };
        assert!(!unknown.to_string().contains('/'));
    }

    #[test]
    fn test_outcome_accessors() {
        let progress = Progress {
            total_size: None,
            downloaded: 7,
        };
        assert!(TransferOutcome::Cancelled(progress).is_cancelled());
        assert!(!TransferOutcome::Completed(progress).is_cancelled());
        assert_eq!(TransferOutcome::Completed(progress).progress().downloaded, 7);
    }
}
