//! Error types shared by readers, writers and the transcoding pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for codec and pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure is fatal to the operation that raised it; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed SAM text
    #[error("line {line}: {reason}")]
    Format {
        /// 1-based line number in the input text
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// A record violates a BAM encoding limit or does not match the header
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A compression worker failed to serialize or compress a block
    #[error("failed to encode block #{seq}: {reason}")]
    Encoding {
        /// Sequence number of the failed block
        seq: u64,
        /// Underlying failure
        reason: String,
    },

    /// Malformed or truncated BAM/BGZF input
    #[error("invalid BAM data: {0}")]
    InvalidBam(String),

    /// The compression pool went away while a block was still outstanding
    #[error("compression pool stopped before block #{expected} was delivered")]
    Reorder {
        /// The sequence number the writer thread was waiting for
        expected: u64,
    },

    /// I/O failure tied to a specific file
    #[error("{}: {source}", .path.display())]
    File {
        /// The file being opened, read or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Error::Format { line, reason: reason.into() }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::File { path: path.into(), source }
    }
}

// The BAM reader implements `Read`, so failures crossing that boundary travel as
// `io::Error` and are unwrapped again on the other side.
impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Recovers a codec error that was tunnelled through `io::Error`.
pub(crate) fn from_io(error: io::Error) -> Error {
    if error.get_ref().map_or(false, |inner| inner.is::<Error>()) {
        // Checked above.
        match error.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => Error::Io(io::Error::new(io::ErrorKind::InvalidData, inner)),
            None => Error::InvalidBam("unknown I/O failure".to_string()),
        }
    } else {
        Error::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_names_line() {
        let msg = format!("{}", Error::format(17, "expected at least 11 fields, found 3"));
        assert_eq!(msg, "line 17: expected at least 11 fields, found 3");
    }

    #[test]
    fn test_encoding_error_names_sequence_number() {
        let error = Error::Encoding { seq: 5, reason: "read name too long".to_string() };
        assert!(format!("{error}").contains("block #5"));
    }

    #[test]
    fn test_error_survives_io_round_trip() {
        let io_error: io::Error = Error::InvalidBam("bad CRC".to_string()).into();
        match from_io(io_error) {
            Error::InvalidBam(reason) => assert_eq!(reason, "bad CRC"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(from_io(io_error), Error::Io(_)));
    }
}
