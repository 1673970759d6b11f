//! Voltronic Communication Link Library
//!
//! Core abstractions shared by every layer of the Voltronic protocol
//! stack.
//!
//! # Architecture
//!
//! This library provides:
//! - **Core Trait**: `CommandClient` - the capability every transport and
//!   decorator implements
//! - **Errors**: `LinkError` - the full failure taxonomy of the stack,
//!   cloneable so results can be cached and replayed
//! - **Metrics**: `TransportMetrics` - call-site recorded counters and
//!   timers, snapshot-readable by an external exporter
//!
//! Protocol implementations (serial transport, caching, auto-discovery)
//! live in `voltronic-protocols`.

pub mod error;
pub mod metrics;
pub mod traits;

// Re-export core types
pub use error::{LinkError, Result};
pub use metrics::{MetricsSnapshot, TransportMetrics};
pub use traits::CommandClient;
