//! Voltronic Protocol Implementations
//!
//! Client-side protocol stack for Voltronic inverter/UPS devices over
//! RS232.
//!
//! # Architecture
//!
//! Everything implements the `CommandClient` trait from
//! `voltronic-comlink`, so the layers stack as trait objects in any
//! order:
//!
//! - [`rs232::Rs232Client`] - the transport: framing, checksum
//!   verification, NAK detection, retries with backoff
//! - [`cached::CachedClient`] - serves repeated commands from memory,
//!   replays recent failures
//! - [`discovery::AutoRs232Client`] - lazy port resolution, tears the
//!   transport down on failure so the next command reconnects
//!
//! A typical production stack is cache over auto-discovery:
//!
//! ```no_run
//! use std::sync::Arc;
//! use voltronic_comlink::TransportMetrics;
//! use voltronic_protocols::cached::{CacheOptions, CachedClient};
//! use voltronic_protocols::discovery::{AutoRs232Client, AutoRs232Options};
//!
//! let metrics = Arc::new(TransportMetrics::new());
//! let transport = AutoRs232Client::new(AutoRs232Options::default(), metrics);
//! let client = CachedClient::new(Box::new(transport), CacheOptions::default());
//! ```

pub mod cached;
pub mod crc16;
pub mod discovery;
pub mod frame;
pub mod rs232;

// Re-export common types for convenience
pub use voltronic_comlink::{CommandClient, LinkError, Result, TransportMetrics};
