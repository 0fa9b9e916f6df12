//! Error kinds surfaced by the pipeline.

use std::io;
use std::path::Path;

use failure::Fail;

pub type Result<T> = std::result::Result<T, WordCountError>;

#[derive(Debug, Fail)]
pub enum WordCountError {
    #[fail(display = "Invalid configuration: {}", reason)]
    Configuration { reason: String },

    #[fail(display = "I/O failure on {}: {}", path, cause)]
    Io {
        path: String,
        #[cause]
        cause: io::Error,
    },

    #[fail(display = "Scratch store {} failed for key {:?}: {}", operation, key, cause)]
    Store {
        operation: &'static str,
        key: String,
        #[cause]
        cause: sled::Error,
    },

    #[fail(
        display = "Scratch store holds a {} byte value for key {:?}, expected 8",
        len, key
    )]
    CorruptValue { key: String, len: usize },

    #[fail(display = "Protocol violation: {}", reason)]
    Protocol { reason: String },

    #[fail(display = "Pipeline task did not complete: {}", cause)]
    Task {
        #[cause]
        cause: tokio::task::JoinError,
    },
}

impl WordCountError {
    pub fn configuration<S: Into<String>>(reason: S) -> WordCountError {
        WordCountError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn protocol<S: Into<String>>(reason: S) -> WordCountError {
        WordCountError::Protocol {
            reason: reason.into(),
        }
    }

    pub fn io<P: AsRef<Path>>(path: P, cause: io::Error) -> WordCountError {
        WordCountError::Io {
            path: path.as_ref().display().to_string(),
            cause,
        }
    }

    pub fn store(operation: &'static str, key: &str, cause: sled::Error) -> WordCountError {
        WordCountError::Store {
            operation,
            key: key.to_string(),
            cause,
        }
    }
}

impl From<tokio::task::JoinError> for WordCountError {
    fn from(cause: tokio::task::JoinError) -> WordCountError {
        WordCountError::Task { cause }
    }
}

/// Attach the offending path to a raw I/O result.
pub(crate) trait IoContext<T> {
    fn at<P: AsRef<Path>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at<P: AsRef<Path>>(self, path: P) -> Result<T> {
        self.map_err(|cause| WordCountError::io(path, cause))
    }
}
