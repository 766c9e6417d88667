//! Liveness probe for the watched Minecraft server.
//!
//! One probe is a single Server List Ping round trip bounded by a timeout.
//! There are no retries: the next scheduled tick is the retry.

pub mod packet;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use packet::{PacketError, StatusResponse, MAX_VARINT_LEN};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] PacketError),
}

/// Result of one probe attempt.
#[derive(Debug)]
pub enum Outcome {
    Online { players: u32 },
    /// Nothing is listening on the target port.
    Offline,
    /// The probe could not complete. Reconciled exactly like `Offline`.
    ProbeError(ProbeError),
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> Outcome;
}

/// Probes a Java edition server with the Server List Ping protocol.
pub struct MinecraftProber {
    host: String,
    port: u16,
    timeout: Duration,
}

impl MinecraftProber {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Runs one status exchange, failing with [`ProbeError::Timeout`] if the
    /// whole round trip (connect included) exceeds the configured timeout.
    pub async fn query(&self) -> Result<StatusResponse, ProbeError> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }

    async fn exchange(&self) -> Result<StatusResponse, ProbeError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        stream.write_all(&packet::handshake(&self.host, self.port)).await?;
        stream.write_all(&packet::status_request()).await?;
        stream.flush().await?;

        let frame_len = packet::checked_frame_len(read_varint_from(&mut stream).await?)?;
        let mut payload = vec![0u8; frame_len];
        stream.read_exact(&mut payload).await?;

        Ok(packet::decode_status(&payload)?)
    }
}

#[async_trait]
impl Prober for MinecraftProber {
    async fn probe(&self) -> Outcome {
        match self.query().await {
            Ok(status) => {
                match &status.version {
                    Some(version) => tracing::debug!(
                        "Probe ok: {}/{} players, version {} (protocol {})",
                        status.players.online,
                        status.players.max,
                        version.name,
                        version.protocol
                    ),
                    None => tracing::debug!(
                        "Probe ok: {}/{} players",
                        status.players.online,
                        status.players.max
                    ),
                }
                Outcome::Online {
                    players: status.players.online,
                }
            }
            Err(ProbeError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                tracing::debug!("Probe refused by {}:{}", self.host, self.port);
                Outcome::Offline
            }
            Err(e) => {
                tracing::debug!("Probe of {}:{} failed: {e}", self.host, self.port);
                Outcome::ProbeError(e)
            }
        }
    }
}

/// Reads one VarInt off the stream, byte by byte.
async fn read_varint_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProbeError> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    loop {
        let byte = reader.read_u8().await?;
        bytes.push(byte);
        if byte & 0x80 == 0 || bytes.len() == MAX_VARINT_LEN {
            let (value, _) = packet::read_varint(&bytes)?;
            return Ok(value);
        }
    }
}
