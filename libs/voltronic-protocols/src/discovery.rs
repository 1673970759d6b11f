//! Serial port auto-discovery decorator
//!
//! Wraps the RS232 transport with lazy port resolution: the first
//! command enumerates the system's serial ports, picks the first one no
//! exclusion filter rejects, and opens a client on it. When a delegated
//! command fails the client is torn down, so the next command resolves
//! and connects from scratch - unplugged adapters and renumbered ports
//! heal without restarting the process.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tokio_serial::SerialPortInfo;
use tracing::{debug, info, warn};

use voltronic_comlink::{CommandClient, LinkError, Result, TransportMetrics};

use crate::rs232::{Rs232Client, Rs232Options};

/// Port exclusion predicate; return `true` to reject the port.
pub type PortFilter = Box<dyn Fn(&SerialPortInfo) -> bool + Send + Sync>;

/// Auto-discovery options.
#[derive(Default)]
pub struct AutoRs232Options {
    /// Fixed port path. When set, enumeration is skipped entirely and
    /// the exclusion filters are not consulted.
    pub path: Option<String>,
    /// Filters applied in order during enumeration
    pub exclude: Vec<PortFilter>,
    /// Options for the transport opened on the resolved port
    pub rs232: Rs232Options,
}

/// How ports are enumerated and opened. The default implementation
/// talks to the OS through `tokio-serial`; tests inject fakes.
pub trait PortConnector: Send + Sync {
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>>;

    fn open(&self, path: &str, options: &Rs232Options) -> Result<Box<dyn CommandClient>>;
}

/// Production [`PortConnector`] backed by `tokio-serial`.
pub struct SerialConnector {
    metrics: Arc<TransportMetrics>,
}

impl SerialConnector {
    pub fn new(metrics: Arc<TransportMetrics>) -> Self {
        Self { metrics }
    }
}

impl PortConnector for SerialConnector {
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>> {
        tokio_serial::available_ports()
            .map_err(|e| LinkError::io(format!("failed to enumerate serial ports: {e}")))
    }

    fn open(&self, path: &str, options: &Rs232Options) -> Result<Box<dyn CommandClient>> {
        let client = Rs232Client::open(path, options.clone(), self.metrics.clone())?;
        Ok(Box::new(client))
    }
}

/// Self-healing [`CommandClient`] decorator with lazy port resolution.
pub struct AutoRs232Client {
    options: AutoRs232Options,
    connector: Box<dyn PortConnector>,
    inner: Mutex<Option<Box<dyn CommandClient>>>,
}

impl AutoRs232Client {
    pub fn new(options: AutoRs232Options, metrics: Arc<TransportMetrics>) -> Self {
        Self::with_connector(options, Box::new(SerialConnector::new(metrics)))
    }

    pub fn with_connector(options: AutoRs232Options, connector: Box<dyn PortConnector>) -> Self {
        Self {
            options,
            connector,
            inner: Mutex::new(None),
        }
    }

    fn select_path(&self) -> Result<String> {
        let ports = self.connector.list_ports()?;
        for port in ports {
            if self.options.exclude.iter().any(|filter| filter(&port)) {
                debug!("port excluded: {}", port.port_name);
                continue;
            }
            return Ok(port.port_name);
        }
        Err(LinkError::NoPort)
    }

    /// Resolve and open the inner client if this is the first command
    /// (or the previous client was torn down after a failure).
    fn ensure<'a>(
        &self,
        slot: &'a mut Option<Box<dyn CommandClient>>,
    ) -> Result<&'a dyn CommandClient> {
        if slot.is_none() {
            let path = match &self.options.path {
                Some(path) => path.clone(),
                None => self.select_path()?,
            };
            info!("using serial port: {}", path);
            *slot = Some(self.connector.open(&path, &self.options.rs232)?);
        }
        slot.as_deref().ok_or(LinkError::NoPort)
    }

    async fn teardown(&self, slot: &mut Option<Box<dyn CommandClient>>, err: &LinkError) {
        warn!("dropping serial client after failure: {}", err);
        if let Some(client) = slot.take() {
            client.destroy().await;
        }
    }
}

#[async_trait]
impl CommandClient for AutoRs232Client {
    async fn execute(&self, command: &str, validator: Option<&Regex>) -> Result<String> {
        let mut slot = self.inner.lock().await;
        let client = self.ensure(&mut slot)?;
        match client.execute(command, validator).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.teardown(&mut slot, &err).await;
                Err(err)
            },
        }
    }

    async fn execute_raw(&self, command: &str) -> Result<Vec<u8>> {
        let mut slot = self.inner.lock().await;
        let client = self.ensure(&mut slot)?;
        match client.execute_raw(command).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.teardown(&mut slot, &err).await;
                Err(err)
            },
        }
    }

    async fn destroy(&self) {
        let mut slot = self.inner.lock().await;
        if let Some(client) = slot.take() {
            client.destroy().await;
        }
    }
}
