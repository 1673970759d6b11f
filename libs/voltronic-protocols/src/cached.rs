//! Response caching decorator
//!
//! Wraps any [`CommandClient`] and serves repeated commands from memory.
//! Successes and failures are both cached: a device that just answered
//! gives the same answer again within the TTL, and a device that just
//! failed will almost certainly fail again, so hammering it during the
//! error window only delays recovery.
//!
//! Identity commands (`QPI`, `QID`, `QMN`) answer with constants for the
//! lifetime of the device and get a much longer TTL by default.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use voltronic_comlink::{CommandClient, LinkError, Result};

/// Cache TTL configuration, all values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// TTL for commands without an override
    pub common_ttl_ms: u64,
    /// Per-command TTL overrides
    pub command_ttls_ms: HashMap<String, u64>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        let mut command_ttls_ms = HashMap::new();
        // Device identity never changes while the cable is plugged in
        for cmd in ["QPI", "QID", "QMN"] {
            command_ttls_ms.insert(cmd.to_string(), 600_000);
        }
        Self {
            common_ttl_ms: 1_000,
            command_ttls_ms,
        }
    }
}

impl CacheOptions {
    fn ttl_for(&self, command: &str) -> u64 {
        self.command_ttls_ms
            .get(command)
            .copied()
            .unwrap_or(self.common_ttl_ms)
    }
}

struct Entry<T> {
    value: T,
    stored_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn expired(&self, ttl_ms: u64) -> bool {
        self.stored_at.elapsed().as_millis() as u64 >= ttl_ms
    }
}

#[derive(Default)]
struct CacheState {
    text: HashMap<String, Entry<String>>,
    raw: HashMap<String, Entry<Vec<u8>>>,
    errors: HashMap<String, Entry<LinkError>>,
}

/// Caching [`CommandClient`] decorator.
///
/// The cache mutex is held across the delegated call, so concurrent
/// identical commands coalesce into a single device transaction and the
/// rest are served from the freshly stored entry.
pub struct CachedClient {
    inner: Box<dyn CommandClient>,
    options: CacheOptions,
    state: Mutex<CacheState>,
}

impl CachedClient {
    pub fn new(inner: Box<dyn CommandClient>, options: CacheOptions) -> Self {
        Self {
            inner,
            options,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Check the error cache, then the mode's value cache. Returns the
    /// cached outcome, or `None` when the caller must go to the device.
    fn lookup<T: Clone>(
        errors: &mut HashMap<String, Entry<LinkError>>,
        values: &mut HashMap<String, Entry<T>>,
        command: &str,
        ttl_ms: u64,
    ) -> Option<Result<T>> {
        if let Some(entry) = errors.get(command) {
            if entry.expired(ttl_ms) {
                errors.remove(command);
            } else {
                debug!("{}: cached error replayed", command);
                return Some(Err(entry.value.clone()));
            }
        }
        if let Some(entry) = values.get(command) {
            if entry.expired(ttl_ms) {
                values.remove(command);
            } else {
                debug!("{}: cache hit", command);
                return Some(Ok(entry.value.clone()));
            }
        }
        None
    }
}

#[async_trait]
impl CommandClient for CachedClient {
    async fn execute(&self, command: &str, validator: Option<&Regex>) -> Result<String> {
        let ttl_ms = self.options.ttl_for(command);
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(outcome) = Self::lookup(&mut state.errors, &mut state.text, command, ttl_ms) {
            return outcome;
        }

        match self.inner.execute(command, validator).await {
            Ok(value) => {
                state
                    .text
                    .insert(command.to_string(), Entry::new(value.clone()));
                Ok(value)
            },
            Err(err) => {
                state
                    .errors
                    .insert(command.to_string(), Entry::new(err.clone()));
                Err(err)
            },
        }
    }

    async fn execute_raw(&self, command: &str) -> Result<Vec<u8>> {
        let ttl_ms = self.options.ttl_for(command);
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(outcome) = Self::lookup(&mut state.errors, &mut state.raw, command, ttl_ms) {
            return outcome;
        }

        match self.inner.execute_raw(command).await {
            Ok(value) => {
                state
                    .raw
                    .insert(command.to_string(), Entry::new(value.clone()));
                Ok(value)
            },
            Err(err) => {
                state
                    .errors
                    .insert(command.to_string(), Entry::new(err.clone()));
                Err(err)
            },
        }
    }

    async fn destroy(&self) {
        self.inner.destroy().await;
    }
}
