//! Error types for CP750 sessions

use crate::field::Field;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Cp750Error>;

#[derive(Error, Debug)]
pub enum Cp750Error {
    #[error("Connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Protocol violation: expected response for '{expected}', got '{line}'")]
    ProtocolViolation { expected: String, line: String },

    #[error("Connection closed unexpectedly")]
    StreamClosed,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("No value received for {0}")]
    MissingValue(Field),

    #[error("Unexpected value for {field}: '{value}'")]
    UnexpectedValue { field: Field, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start refresh thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl Cp750Error {
    /// Classify an I/O error raised while exchanging lines with the device.
    ///
    /// Peer-side closure becomes [`Cp750Error::StreamClosed`] and an expired
    /// read timeout becomes [`Cp750Error::Timeout`].
    pub(crate) fn from_stream(err: io::Error, read_timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => Cp750Error::StreamClosed,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Cp750Error::Timeout(read_timeout)
            }
            _ => Cp750Error::Io(err),
        }
    }

    /// True when the session can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Cp750Error::StreamClosed
                | Cp750Error::ConnectionFailed { .. }
                | Cp750Error::ProtocolViolation { .. }
        )
    }
}
