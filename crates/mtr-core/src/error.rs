//! Error types for path measurement.

use crate::report::Report;
use thiserror::Error;

/// Main error type for path measurement operations.
#[derive(Error, Debug)]
pub enum MtrError {
    // Configuration errors
    #[error("Unknown source IP")]
    UnknownSourceIp,

    #[error("Unknown dest IP")]
    UnknownDestIp,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    // Transport errors
    #[error("failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("failed to send probe: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("failed to receive reply: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    #[error("transport closed")]
    TransportClosed,

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// A failed run.
///
/// The run operations always hand back the report assembled so far: for a
/// destination that fails to parse this is an empty default, and for a
/// trace failure it carries the source, destination and probe count with
/// no hops.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct RunError {
    pub report: Report,
    #[source]
    pub source: MtrError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_are_exact() {
        assert_eq!(MtrError::UnknownSourceIp.to_string(), "Unknown source IP");
        assert_eq!(MtrError::UnknownDestIp.to_string(), "Unknown dest IP");
    }

    #[test]
    fn run_error_displays_source() {
        let err = RunError {
            report: Report::default(),
            source: MtrError::UnknownDestIp,
        };
        assert_eq!(err.to_string(), "Unknown dest IP");
        assert!(err.report.hups.is_empty());
    }
}
