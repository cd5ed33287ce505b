//! Raw SCPI socket adapter
//!
//! Builder-based TCP adapter for LAN instruments that expose a raw SCPI
//! socket (R&S NGP800 series, Keysight, Rigol and most LXI instruments listen
//! on port 5025). Commands are written with the write terminator appended;
//! responses are read up to the read terminator. A failed or timed-out
//! exchange closes the session.

use super::{Endpoint, ScpiTransport};
use crate::error::{AppResult, CyclerError};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Builder for constructing a connected [`TcpScpiAdapter`]
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use power_cycler::adapters::TcpScpiAdapterBuilder;
///
/// # async fn example() -> power_cycler::AppResult<()> {
/// let adapter = TcpScpiAdapterBuilder::new("TCPIP0::192.168.0.10::5025::SOCKET")
///     .with_timeout(Duration::from_secs(2))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpScpiAdapterBuilder {
    endpoint: String,
    timeout: Duration,
    read_terminator: String,
    write_terminator: String,
}

impl TcpScpiAdapterBuilder {
    /// Create a new builder with default timeout (5 s) and `\n` terminators
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(5),
            read_terminator: "\n".to_string(),
            write_terminator: "\n".to_string(),
        }
    }

    /// Set timeout for connect and for each write / query round trip
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Response terminator; empty falls back to `\n`
    pub fn with_read_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.read_terminator = terminator.into();
        self
    }

    /// Appended to every command written
    pub fn with_write_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.write_terminator = terminator.into();
        self
    }

    /// Open the session
    ///
    /// # Errors
    /// `CyclerError::Connect` if the endpoint cannot be parsed, resolved or
    /// reached within the timeout.
    pub async fn connect(self) -> AppResult<TcpScpiAdapter> {
        let endpoint: Endpoint = self.endpoint.parse()?;
        if endpoint.from_visa_instr {
            info!(
                "VISA resource '{}' reached through raw SCPI socket {}",
                self.endpoint, endpoint
            );
        }

        let addr = endpoint.socket_addr();
        let stream = match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(CyclerError::connect(&self.endpoint, e)),
            Err(_) => {
                return Err(CyclerError::connect(
                    &self.endpoint,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle on {}: {}", addr, e);
        }

        debug!("SCPI socket {} opened with {:?} timeout", addr, self.timeout);

        let read_terminator = if self.read_terminator.is_empty() {
            b"\n".to_vec()
        } else {
            self.read_terminator.into_bytes()
        };

        Ok(TcpScpiAdapter {
            label: addr,
            timeout: self.timeout,
            read_terminator,
            write_terminator: self.write_terminator,
            stream: Some(BufStream::new(stream)),
        })
    }
}

/// Raw SCPI socket session
pub struct TcpScpiAdapter {
    label: String,
    timeout: Duration,
    read_terminator: Vec<u8>,
    write_terminator: String,
    stream: Option<BufStream<TcpStream>>,
}

impl TcpScpiAdapter {
    /// Per-operation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn stream_for(&mut self, command: &str) -> AppResult<&mut BufStream<TcpStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| CyclerError::command(command, "session closed"))
    }

    /// Drop the session after a failed exchange. A late reply would otherwise
    /// be read as the answer to the next query.
    async fn abandon(&mut self, command: &str, reason: &str) {
        if let Some(mut stream) = self.stream.take() {
            warn!(
                "SCPI socket {} closed after '{}' failed: {}",
                self.label, command, reason
            );
            let _ = tokio::time::timeout(self.timeout, stream.shutdown()).await;
        }
    }
}

async fn write_line(stream: &mut BufStream<TcpStream>, line: &str) -> io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await
}

/// Read up to and including `terminator`, returning the bytes before it.
pub(crate) async fn read_terminated<R>(reader: &mut R, terminator: &[u8]) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let last = terminator.last().copied().unwrap_or(b'\n');
    let mut buf = Vec::new();
    loop {
        let n = reader.read_until(last, &mut buf).await?;
        if n == 0 {
            let reason = if buf.is_empty() {
                "connection closed by instrument"
            } else {
                "response missing terminator"
            };
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason));
        }
        if buf.ends_with(terminator) {
            buf.truncate(buf.len() - terminator.len());
            return Ok(buf);
        }
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiAdapter {
    async fn send(&mut self, command: &str) -> AppResult<()> {
        let timeout = self.timeout;
        let line = format!("{}{}", command, self.write_terminator);
        let result = {
            let stream = self.stream_for(command)?;
            tokio::time::timeout(timeout, write_line(stream, &line)).await
        };

        let reason = match result {
            Ok(Ok(())) => {
                debug!("SCPI write sent: {}", command);
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {:?}", timeout),
        };
        self.abandon(command, &reason).await;
        Err(CyclerError::command(command, reason))
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        let timeout = self.timeout;
        let line = format!("{}{}", command, self.write_terminator);
        let terminator = self.read_terminator.clone();
        let result = {
            let stream = self.stream_for(command)?;
            let round_trip = async {
                write_line(stream, &line).await?;
                read_terminated(stream, &terminator).await
            };
            tokio::time::timeout(timeout, round_trip).await
        };

        let reason = match result {
            Ok(Ok(raw)) => {
                let response = String::from_utf8_lossy(&raw).trim_end().to_string();
                debug!("SCPI query '{}' -> '{}'", command, response);
                return Ok(response);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no response within {:?}", timeout),
        };
        self.abandon(command, &reason).await;
        Err(CyclerError::command(command, reason))
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Shutdown errors are irrelevant once the session is gone
            let _ = tokio::time::timeout(self.timeout, stream.shutdown()).await;
            debug!("SCPI socket {} closed", self.label);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.label
    }
}
