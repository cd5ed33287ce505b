//! SCPI transport implementations
//!
//! This module contains implementations of the [`ScpiTransport`] trait,
//! providing the line-oriented command/response session the power-supply
//! driver is built on.
//!
//! - [`TcpScpiAdapter`]: raw SCPI socket over TCP (port 5025 by default)
//! - [`MockScpiAdapter`]: simulated instrument recording into a [`BenchTrace`]

pub mod endpoint;
pub mod mock_adapter;
pub mod tcp_adapter;

pub use endpoint::Endpoint;
pub use mock_adapter::{BenchTrace, MockScpiAdapter, TraceEntry};
pub use tcp_adapter::{TcpScpiAdapter, TcpScpiAdapterBuilder};

use crate::error::AppResult;
use async_trait::async_trait;

/// Line-oriented SCPI session
///
/// A transport is owned by exactly one driver. Operations are awaited one at
/// a time; there is no pipelining and no retry. Every failure is surfaced
/// to the caller as soon as it happens.
///
/// ## Errors
/// - `send`/`query` on a closed session: `CyclerError::Command`
/// - write or read not completed within the session timeout: `CyclerError::Command`
/// - response missing its terminator (peer closed mid-line): `CyclerError::Command`
#[async_trait]
pub trait ScpiTransport: Send {
    /// Write one command; no response is read.
    async fn send(&mut self, command: &str) -> AppResult<()>;

    /// Write one command and read one terminated response line.
    ///
    /// The response is returned without its terminator or trailing whitespace.
    async fn query(&mut self, command: &str) -> AppResult<String>;

    /// Release the session. Idempotent and infallible.
    async fn close(&mut self);

    /// `false` once closed or abandoned after a failure.
    fn is_open(&self) -> bool;

    /// Human-readable endpoint, for log lines.
    fn endpoint(&self) -> &str;
}
