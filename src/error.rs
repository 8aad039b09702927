//! Crate level errors.
//!
//! # Error Hierarchy
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Service Layer (`crate::error`)
//!
//! - [`Error`]: what [`BreachService`](crate::service::BreachService) and the
//!   HTTP server report: rejected input, partition failures, I/O, config
//!
//! ## Partition Layer (`crate::partition::PartitionError`)
//!
//! - Actor lifecycle, durable store and checkpoint errors
//! - Has `is_retriable()` for backoff decisions
//!
//! ## Conversion
//!
//! [`PartitionError`] converts into [`Error`] via `From`, so partition
//! failures propagate through the service with `?`.

use std::{io, result};

use thiserror::Error as ThisError;

use crate::email::InvalidEmail;
use crate::partition::PartitionError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// The email was rejected before routing.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] InvalidEmail),

    /// Failure inside the partition subsystem.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// An error in the network.
    #[error("IO error: {0:?}")]
    Io(io::ErrorKind),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Temporary condition; the caller may retry the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Partition(e) => e.is_transient(),
            Error::Io(kind) => matches!(
                kind,
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::Interrupted
            ),
            Error::InvalidEmail(_) | Error::Config(_) => false,
        }
    }

    /// Rejected input rather than a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidEmail(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.kind())
    }
}

impl From<Box<dyn std::error::Error>> for Error {
    fn from(e: Box<dyn std::error::Error>) -> Self {
        Error::Config(e.to_string())
    }
}
