//! RPC client for talking to a daemon.
//!
//! Dials the endpoint fresh for every request. Connections are cheap on a
//! site network and a per-call dial means a restarted daemon is picked up
//! immediately, with no pooled sockets to a dead process.

use std::time::Duration;

use meridian_core::config::RpcConfig;
use meridian_core::{DaemonRegistry, Transport};
use meridian_proto::{DaemonId, DaemonStatus, Envelope, Request, Response, StatusSnapshot};

use crate::error::{DaemonError, Result};
use crate::wire::{read_response, write_request};

/// Client handle for one daemon.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    daemon: DaemonId,
    transport: Transport,
    connect_timeout: Duration,
    request_timeout: Duration,
    force_update_timeout: Duration,
}

impl DaemonClient {
    #[must_use]
    pub fn new(daemon: DaemonId, transport: Transport, rpc: &RpcConfig) -> Self {
        Self {
            daemon,
            transport,
            connect_timeout: rpc.connect_timeout,
            request_timeout: rpc.request_timeout,
            force_update_timeout: rpc.force_update_timeout,
        }
    }

    /// Builds a client from the registry entry for `daemon`.
    pub fn from_registry(
        registry: &DaemonRegistry,
        daemon: DaemonId,
        rpc: &RpcConfig,
    ) -> Result<Self> {
        let transport = registry
            .transport(daemon)
            .ok_or(DaemonError::Unregistered { daemon })?;
        Ok(Self::new(daemon, transport, rpc))
    }

    #[must_use]
    pub const fn daemon(&self) -> DaemonId {
        self.daemon
    }

    /// Sends one request and waits for the matching response.
    ///
    /// An error response from the daemon comes back as `DaemonError::Rpc`,
    /// preserving the wire-level taxonomy for the caller.
    pub async fn request(&self, request: Request) -> Result<Response> {
        // Forced info refreshes legitimately take longer than a tick.
        let reply_timeout = match request {
            Request::GetInfo { force_update: true } => self.force_update_timeout,
            _ => self.request_timeout,
        };

        let mut conn = tokio::time::timeout(self.connect_timeout, self.transport.connect())
            .await
            .map_err(|_| DaemonError::Timeout { daemon: self.daemon })??;

        let envelope = Envelope::new(request);
        write_request(&mut conn, &envelope).await?;

        let reply = tokio::time::timeout(reply_timeout, read_response(&mut conn))
            .await
            .map_err(|_| DaemonError::Timeout { daemon: self.daemon })??;

        match reply.payload {
            Response::Error(e) => Err(e.into()),
            payload => Ok(payload),
        }
    }

    /// Composite health as the daemon reports it.
    pub async fn get_status(&self) -> Result<DaemonStatus> {
        match self.request(Request::GetStatus).await? {
            Response::Status(status) => Ok(status),
            _ => Err(DaemonError::UnexpectedResponse { daemon: self.daemon }),
        }
    }

    /// Latest snapshot, optionally forcing a fresh hardware poll first.
    pub async fn get_info(&self, force_update: bool) -> Result<StatusSnapshot> {
        match self.request(Request::GetInfo { force_update }).await? {
            Response::Info(snapshot) => Ok(snapshot),
            _ => Err(DaemonError::UnexpectedResponse { daemon: self.daemon }),
        }
    }

    /// Sends a subsystem command and returns the acknowledgement string.
    pub async fn command(&self, request: Request) -> Result<String> {
        match self.request(request).await? {
            Response::Ack(ack) => Ok(ack),
            _ => Err(DaemonError::UnexpectedResponse { daemon: self.daemon }),
        }
    }

    /// Asks the daemon to exit gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.command(Request::Shutdown).await.map(|_| ())
    }

    /// Wakes the daemon's control loop for an immediate tick.
    pub async fn prod(&self) -> Result<()> {
        self.command(Request::Prod).await.map(|_| ())
    }
}
