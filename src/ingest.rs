//! The datagram listener that turns relayed submissions into records.
//!
//! Each datagram carries one submission as a JSON object of string fields.
//! The listener stamps it with the receipt time and hands it to the
//! [`StoreWriter`]. A datagram that fails to decode, or a record that fails
//! to save, is logged and counted; the receive loop itself never stops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::stats::IngestStats;
use crate::store_writer::StoreWriter;
use crate::submission::{RecordKey, Submission};

/// Largest payload read from a single datagram. Anything longer is
/// truncated by the socket and then fails to decode.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// First pause after a failed receive; doubles per consecutive failure.
pub const RECEIVE_RETRY_BASE_DELAY: Duration = Duration::from_millis(10);
/// Longest pause between receive attempts.
pub const RECEIVE_RETRY_MAX_DELAY: Duration = Duration::from_secs(1);

/// Pause before the next receive after `consecutive_failures` failed ones.
pub fn receive_retry_delay(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    RECEIVE_RETRY_BASE_DELAY
        .saturating_mul(1 << exponent)
        .min(RECEIVE_RETRY_MAX_DELAY)
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("datagram is not a JSON object of string fields: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parses one datagram payload into a [`Submission`].
pub fn decode_datagram(payload: &[u8]) -> Result<Submission, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let submission = serde_json::from_str(text)?;

    Ok(submission)
}

#[derive(Debug)]
pub struct IngestListener {
    socket: UdpSocket,
    writer: StoreWriter,
    stats: Arc<IngestStats>,
}

impl IngestListener {
    pub async fn bind<A: ToSocketAddrs>(address: A, writer: StoreWriter) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(address).await?;

        Ok(IngestListener {
            socket,
            writer,
            stats: Arc::new(IngestStats::default()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Receives datagrams for as long as the process runs.
    ///
    /// Datagrams are handled strictly in receipt order: the next one is not
    /// read until the previous record has been saved or has failed.
    pub async fn run(self) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        if let Ok(address) = self.socket.local_addr() {
            tracing::info!(%address, "ingest listener bound");
        }

        let mut consecutive_failures = 0u32;

        loop {
            let (number_of_bytes, peer) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => {
                    consecutive_failures = 0;
                    received
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = receive_retry_delay(consecutive_failures);
                    tracing::warn!(error = %e, ?delay, "error receiving datagram");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            self.handle_datagram(&buffer[..number_of_bytes], peer).await;
        }
    }

    async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) {
        self.stats.record_received();

        let submission = match decode_datagram(payload) {
            Ok(submission) => submission,
            Err(e) => {
                self.stats.record_decode_failure();
                tracing::warn!(%peer, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        let key = RecordKey::now();

        match self.writer.append(key.clone(), submission).await {
            Ok(()) => {
                self.stats.record_persisted();
                tracing::debug!(%key, %peer, "record persisted");
            }
            Err(e) => {
                self.stats.record_store_failure();
                tracing::error!(%key, error = %e, "failed to persist record");
            }
        }
    }
}
