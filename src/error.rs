// src/error.rs

use std::io;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `z21-rs` library.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied value is outside its documented range. Nothing was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to connect to command station at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No datagram arrived within the configured receive window.
    #[error("Timed out after {0:?} waiting for a reply from the command station")]
    Timeout(Duration),

    #[error("Transport is closed")]
    Closed,

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The command station answered LAN_X_UNKNOWN_COMMAND.
    #[error("Command station rejected the command as unknown")]
    UnknownCommand,

    /// The decoder did not acknowledge the CV access (LAN_X_CV_NACK).
    #[error("CV {cv} was not acknowledged by the decoder")]
    CvNack { cv: u16 },

    /// Short circuit on the programming track during the CV access (LAN_X_CV_NACK_SC).
    #[error("Short circuit on the programming track while accessing CV {cv}")]
    CvNackShortCircuit { cv: u16 },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns `true` for failures of the link itself, as opposed to protocol outcomes.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Io(_) | Error::Closed)
    }

    pub(crate) fn connect(addr: &str, source: io::Error) -> Self {
        Error::Connect {
            addr: addr.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
