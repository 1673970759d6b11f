//! Voltronic RS232 transport
//!
//! Half-duplex request/response over a serial line. The device never
//! speaks unprompted and cannot interleave commands, so a single mutex
//! serializes the entire retry loop: whoever holds it owns the wire
//! until their command settles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use voltronic_comlink::{CommandClient, LinkError, Result, TransportMetrics};

use crate::frame::{self, FrameCodec, MARKER};

/// Serial transport options.
///
/// `retry_pauses_ms` doubles as the retry schedule: a command gets
/// `retry_pauses_ms.len() + 1` attempts, with pause `i` slept after
/// failed attempt `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rs232Options {
    /// Line speed; Voltronic devices ship at 2400 baud
    pub baud_rate: u32,
    /// Quiet period before each write, some firmwares drop back-to-back
    /// commands
    pub delay_ms: u64,
    /// Per-attempt deadline for a complete response frame
    pub timeout_ms: u64,
    /// Backoff schedule between attempts
    pub retry_pauses_ms: Vec<u64>,
}

impl Default for Rs232Options {
    fn default() -> Self {
        Self {
            baud_rate: 2400,
            delay_ms: 0,
            timeout_ms: 1000,
            retry_pauses_ms: vec![10, 100, 500, 1000, 2000],
        }
    }
}

struct Link<S> {
    writer: WriteHalf<S>,
    frames: FramedRead<ReadHalf<S>, FrameCodec>,
}

/// Serial command client.
///
/// Generic over the byte stream so tests can run against
/// `tokio::io::duplex`; production code uses [`Rs232Client::open`].
pub struct Rs232Client<S> {
    link: Mutex<Option<Link<S>>>,
    options: Rs232Options,
    metrics: Arc<TransportMetrics>,
    nak: Vec<u8>,
}

impl Rs232Client<SerialStream> {
    /// Open a serial port and build a client on top of it.
    pub fn open(path: &str, options: Rs232Options, metrics: Arc<TransportMetrics>) -> Result<Self> {
        let stream = tokio_serial::new(path, options.baud_rate)
            .open_native_async()
            .map_err(|e| LinkError::io(format!("failed to open serial port {path}: {e}")))?;
        info!("RS232 opened: {} @{}baud", path, options.baud_rate);
        Ok(Self::from_stream(stream, options, metrics))
    }
}

impl<S> Rs232Client<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Build a client over an already-open duplex byte stream.
    pub fn from_stream(stream: S, options: Rs232Options, metrics: Arc<TransportMetrics>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            link: Mutex::new(Some(Link {
                writer,
                frames: FramedRead::new(reader, FrameCodec),
            })),
            options,
            metrics,
            nak: frame::pack_bytes(b"(NAK"),
        }
    }

    pub fn options(&self) -> &Rs232Options {
        &self.options
    }

    pub fn metrics(&self) -> &Arc<TransportMetrics> {
        &self.metrics
    }

    /// Run the retry loop for one command, mapping the stripped payload
    /// through `finish` on each attempt.
    async fn run<T, F>(&self, command: &str, finish: F) -> Result<T>
    where
        T: Send,
        F: Fn(&[u8]) -> Result<T> + Send + Sync,
    {
        let started = Instant::now();
        // A pack failure is deterministic, retrying cannot fix it
        let packed = frame::pack(command)?;

        let mut guard = self.link.lock().await;
        self.metrics.record_acquire(started.elapsed());

        let link = guard
            .as_mut()
            .ok_or_else(|| LinkError::io("port is closed"))?;

        let attempts = self.options.retry_pauses_ms.len() as u32 + 1;
        let mut outcome = Err(LinkError::TooManyAttempts(attempts));
        for attempt in 0..attempts {
            match self.attempt(link, &packed, &finish).await {
                Ok(value) => {
                    debug!("{} ok (attempt {}/{})", command, attempt + 1, attempts);
                    outcome = Ok(value);
                    break;
                },
                Err(err) => {
                    self.metrics.record_error(err.kind());
                    warn!("{} attempt {}/{}: {}", command, attempt + 1, attempts, err);
                    if let Some(&pause) = self.options.retry_pauses_ms.get(attempt as usize) {
                        sleep(Duration::from_millis(pause)).await;
                    }
                },
            }
        }

        self.metrics.record_execute(started.elapsed());
        outcome
    }

    async fn attempt<T, F>(&self, link: &mut Link<S>, packed: &[u8], finish: &F) -> Result<T>
    where
        T: Send,
        F: Fn(&[u8]) -> Result<T> + Send + Sync,
    {
        sleep(Duration::from_millis(self.options.delay_ms)).await;

        // Drop whatever a previous command left on the wire
        while let Some(Some(stale)) = link.frames.next().now_or_never() {
            match stale {
                Ok(f) => debug!("RX stale: {}B dropped", f.len()),
                Err(_) => break,
            }
        }
        link.frames.read_buffer_mut().clear();

        link.writer.write_all(packed).await?;
        link.writer.flush().await?;
        debug!("TX: {}B", packed.len());

        let deadline = Duration::from_millis(self.options.timeout_ms);
        let response = match timeout(deadline, link.frames.next()).await {
            Ok(Some(Ok(f))) => f,
            Ok(Some(Err(e))) => return Err(LinkError::io(format!("read error: {e}"))),
            Ok(None) => return Err(LinkError::io("stream closed")),
            Err(_) => return Err(LinkError::Timeout(self.options.timeout_ms)),
        };
        debug!("RX: {}B", response.len());

        if response[..] == self.nak[..] {
            return Err(LinkError::NegativeAcknowledgement);
        }

        let payload = frame::unpack(&response)?;
        if payload.first() != Some(&MARKER) {
            return Err(LinkError::invalid_message("response missing leading marker"));
        }
        finish(&payload[1..])
    }
}

#[async_trait]
impl<S> CommandClient for Rs232Client<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn execute(&self, command: &str, validator: Option<&Regex>) -> Result<String> {
        self.run(command, |body| {
            let text = std::str::from_utf8(body)
                .map_err(|e| LinkError::encoding(format!("response is not valid ASCII: {e}")))?;
            if let Some(pattern) = validator {
                if !pattern.is_match(text) {
                    return Err(LinkError::validation(format!(
                        "response {text:?} does not match {pattern}"
                    )));
                }
            }
            Ok(text.to_string())
        })
        .await
    }

    async fn execute_raw(&self, command: &str) -> Result<Vec<u8>> {
        self.run(command, |body| Ok(body.to_vec())).await
    }

    async fn destroy(&self) {
        let mut guard = self.link.lock().await;
        if let Some(mut link) = guard.take() {
            if let Err(e) = link.writer.shutdown().await {
                debug!("shutdown: {}", e);
            }
            info!("RS232 closed");
        }
    }
}
