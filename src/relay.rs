use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};

use crate::form::{decode_form, FormError};
use crate::ingest::MAX_DATAGRAM_SIZE;
use crate::stats::RelayStats;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("malformed form body: {0}")]
    MalformedBody(#[from] FormError),
    #[error("submission of {size} bytes exceeds the {limit} byte datagram limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("failed to serialize submission: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Forwards decoded form submissions to the ingest listener, one datagram
/// per submission, without waiting for any acknowledgement.
#[derive(Debug)]
pub struct SubmissionRelay {
    socket: UdpSocket,
    ingest_addr: SocketAddr,
    stats: Arc<RelayStats>,
}

impl SubmissionRelay {
    /// Resolves the ingest address and binds an ephemeral socket of the
    /// same address family to send from.
    pub async fn connect<A: ToSocketAddrs>(ingest_address: A) -> std::io::Result<Self> {
        let ingest_addr = lookup_host(ingest_address).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ingest address did not resolve",
            )
        })?;

        let local_addr: SocketAddr = match ingest_addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local_addr).await?;

        Ok(SubmissionRelay {
            socket,
            ingest_addr,
            stats: Arc::new(RelayStats::default()),
        })
    }

    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest_addr
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Decodes a form body and sends it to the ingest listener.
    ///
    /// Returns an error only when the body itself cannot be relayed; a body
    /// that fails here never produces a datagram. Send failures are logged
    /// and counted but not returned, since delivery is never confirmed anyway.
    pub async fn relay(&self, body: &[u8]) -> Result<(), RelayError> {
        let payload = match self.encode(body) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.record_rejected();
                return Err(e);
            }
        };

        match self.socket.send_to(&payload, self.ingest_addr).await {
            Ok(_) => {
                self.stats.record_relayed();
                tracing::debug!(ingest = %self.ingest_addr, bytes = payload.len(), "submission relayed");
            }
            Err(e) => {
                self.stats.record_send_failure();
                tracing::warn!(ingest = %self.ingest_addr, error = %e, "failed to send submission datagram");
            }
        }

        Ok(())
    }

    fn encode(&self, body: &[u8]) -> Result<Vec<u8>, RelayError> {
        let submission = decode_form(body)?;
        let payload = serde_json::to_vec(&submission)?;

        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(RelayError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        Ok(payload)
    }
}
