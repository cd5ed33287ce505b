//! Error types for the power cycler.
//!
//! `CyclerError` is the single error type shared by the transport, the
//! power-supply driver, the digital-output driver and the orchestrator. Using
//! `thiserror`, every variant renders a categorized description that names the
//! failing operation, so an operator can tell a wrong address from a dead line
//! without reading a backtrace.
//!
//! ## Error Categories
//!
//! - **`Connect`**: the instrument session could not be established (bad
//!   endpoint, unreachable host, connect timeout).
//! - **`Command`**: a command or query was sent on an open session and failed
//!   or timed out, or the session was already closed.
//! - **`Parse`**: a response arrived but could not be decoded into the expected
//!   numeric shape.
//! - **`Io`**: the digital-output subsystem is unavailable or faulted.
//! - **`Config`** / **`Configuration`**: the configuration could not be loaded,
//!   or loaded but failed validation.
//! - **`ShutdownFailed`**: best-effort shutdown steps that failed. Cleanup
//!   continues past these; they are reported, never re-raised.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, CyclerError>;

/// Every failure the cycler can report
#[derive(Error, Debug)]
pub enum CyclerError {
    /// The instrument session could not be opened
    #[error("Connection error: cannot open instrument session at '{endpoint}': {reason}")]
    Connect {
        /// Endpoint as configured
        endpoint: String,
        /// Parse, resolve or socket failure
        reason: String,
    },

    /// A command or query failed on an open session
    #[error("Command error: '{command}' failed: {reason}")]
    Command {
        /// SCPI text that was being sent
        command: String,
        /// Transport failure, timeout or closed session
        reason: String,
    },

    /// A query answered with something that could not be decoded
    #[error("Parse error: response '{response}' to '{command}' is invalid: {reason}")]
    Parse {
        /// Query that produced the response
        command: String,
        /// Raw response text
        response: String,
        /// What was wrong with it
        reason: String,
    },

    /// The indicator line could not be claimed or driven
    #[error("Digital output error on GPIO{line}: {reason}")]
    Io {
        /// BCM GPIO number
        line: u8,
        /// Backend failure
        reason: String,
    },

    /// Configuration could not be loaded or extracted
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Operation not allowed in the current cycle state
    #[error("Cycle state error: {0}")]
    State(String),

    /// One or more best-effort shutdown steps failed
    #[error("Shutdown failed with errors: {}", JoinErrors(.0))]
    ShutdownFailed(Vec<CyclerError>),
}

impl CyclerError {
    pub(crate) fn connect(endpoint: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn command(command: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(line: u8, reason: impl fmt::Display) -> Self {
        Self::Io {
            line,
            reason: reason.to_string(),
        }
    }

    /// Short category name used in operator-facing reports.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Command { .. } => "command",
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
            Self::Config(_) | Self::Configuration(_) => "configuration",
            Self::State(_) => "state",
            Self::ShutdownFailed(_) => "shutdown",
        }
    }

    /// `true` for a malformed response, which the cycle tolerates
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

struct JoinErrors<'a>(&'a [CyclerError]);

impl fmt::Display for JoinErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
