//! Periodic power cycling of a SCPI bench power supply with a synchronized
//! digital indicator line.
//!
//! The crate is layered leaves-first:
//!
//! - [`adapters`]: SCPI transports (raw TCP socket and a simulated instrument).
//! - [`instrument`]: the typed power-supply driver built on a transport.
//! - [`hardware`]: the digital-output line (Raspberry Pi GPIO or simulated).
//! - [`cycle`]: the orchestrator that sequences both resources through the
//!   energize / de-energize state machine and guarantees release on exit.
//!
//! Configuration lives in [`config`], the error taxonomy in [`error`].

pub mod adapters;
pub mod config;
pub mod cycle;
pub mod error;
pub mod hardware;
pub mod instrument;

pub use error::{AppResult, CyclerError};
