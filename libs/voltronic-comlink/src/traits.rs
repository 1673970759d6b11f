//! Core command client trait
//!
//! `CommandClient` is the seam every layer of the stack implements:
//! the serial transport at the bottom, the caching and auto-discovery
//! decorators above it. Decorators own their inner layer as
//! `Box<dyn CommandClient>` so stacks compose at runtime.

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;

/// A client that executes Voltronic query/command strings against a device.
#[async_trait]
pub trait CommandClient: Send + Sync {
    /// Execute a command and return the response payload as ASCII text.
    ///
    /// The leading `(` response marker is already stripped. When a
    /// `validator` is supplied the payload must match it, otherwise the
    /// call fails with [`LinkError::Validation`](crate::LinkError).
    async fn execute(&self, command: &str, validator: Option<&Regex>) -> Result<String>;

    /// Execute a command and return the raw response payload bytes
    /// (marker stripped, checksum and terminator removed).
    ///
    /// Needed for responses that are not ASCII, e.g. the `QID` serial
    /// number which is binary-coded.
    async fn execute_raw(&self, command: &str) -> Result<Vec<u8>>;

    /// Release underlying resources.
    ///
    /// Idempotent and infallible. Further calls to `execute` on a
    /// destroyed client fail with an IO error.
    async fn destroy(&self);
}
