//! Instrument endpoint parsing.
//!
//! Accepted forms:
//! - `host` (raw socket on port 5025)
//! - `host:port`
//! - `[ipv6]:port` or a bare IPv6 address (port 5025)
//! - `TCPIP0::host::port::SOCKET`
//! - `TCPIP0::host::INSTR` / `TCPIP0::host::inst0::INSTR`
//!
//! VISA LAN (`INSTR`) resources are reached through the instrument's raw
//! SCPI socket on the default port; the VXI-11 RPC layer is not spoken.

use crate::error::{AppResult, CyclerError};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Default raw SCPI socket port
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Resolved raw socket address of the instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Set when parsed from a VISA `INSTR` resource string
    pub from_visa_instr: bool,
}

impl Endpoint {
    /// Plain `host:port` endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            from_visa_instr: false,
        }
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn parse_visa(input: &str) -> AppResult<Self> {
        let parts: Vec<&str> = input.split("::").collect();
        let interface = parts[0].to_ascii_uppercase();
        let board = interface.strip_prefix("TCPIP").ok_or_else(|| {
            CyclerError::connect(input, "only TCPIP resources are supported")
        })?;
        if !board.chars().all(|c| c.is_ascii_digit()) {
            return Err(CyclerError::connect(
                input,
                format!("invalid interface '{}'", parts[0]),
            ));
        }

        let host = parts.get(1).copied().unwrap_or_default();
        if host.is_empty() {
            return Err(CyclerError::connect(input, "missing host"));
        }

        let class = parts.last().map(|s| s.to_ascii_uppercase()).unwrap_or_default();
        match (class.as_str(), parts.len()) {
            ("SOCKET", 4) => {
                let port = parts[2]
                    .parse::<u16>()
                    .map_err(|_| CyclerError::connect(input, format!("invalid port '{}'", parts[2])))?;
                Ok(Self::new(host, port))
            }
            ("INSTR", 3) | ("INSTR", 4) => Ok(Self {
                host: host.to_string(),
                port: DEFAULT_SCPI_PORT,
                from_visa_instr: true,
            }),
            _ => Err(CyclerError::connect(
                input,
                "expected TCPIP::host::port::SOCKET or TCPIP::host[::device]::INSTR",
            )),
        }
    }
}

impl FromStr for Endpoint {
    type Err = CyclerError;

    fn from_str(s: &str) -> AppResult<Self> {
        let input = s.trim();
        if input.is_empty() {
            return Err(CyclerError::connect(s, "empty endpoint"));
        }

        if let Some(rest) = input.strip_prefix('[') {
            // [ipv6]:port
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| CyclerError::connect(input, "expected [host]:port"))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| CyclerError::connect(input, format!("invalid port '{}'", port)))?;
            return Ok(Self::new(host, port));
        }

        if input.parse::<Ipv6Addr>().is_ok() {
            return Ok(Self::new(input, DEFAULT_SCPI_PORT));
        }

        if input.contains("::") {
            return Self::parse_visa(input);
        }

        match input.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                if host.is_empty() {
                    return Err(CyclerError::connect(input, "missing host"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| CyclerError::connect(input, format!("invalid port '{}'", port)))?;
                Ok(Self::new(host, port))
            }
            Some((_, port)) => Err(CyclerError::connect(
                input,
                format!("invalid port '{}'", port),
            )),
            None => Ok(Self::new(input, DEFAULT_SCPI_PORT)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_addr())
    }
}
