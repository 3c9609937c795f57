use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::config::Config;
use crate::connection::handle_client_connection;
use crate::ingest::IngestListener;
use crate::record_store::RecordStore;
use crate::relay::SubmissionRelay;
use crate::router::RequestRouter;
use crate::store_writer::StoreWriter;

/// The request-facing listener. Each accepted connection gets its own task.
#[derive(Debug)]
pub struct HttpServer {
    listener: TcpListener,
    router: Arc<RequestRouter>,
}

impl HttpServer {
    pub async fn bind<A: ToSocketAddrs>(address: A, router: RequestRouter) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;

        Ok(HttpServer {
            listener,
            router: Arc::new(router),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        if let Ok(address) = self.listener.local_addr() {
            tracing::info!(%address, "HTTP server listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, client_address)) => {
                    let router = Arc::clone(&self.router);

                    tokio::spawn(async move {
                        handle_client_connection(stream, client_address, router).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error accepting connection");
                }
            }
        }
    }
}

/// Starts both listeners and serves until the process is interrupted.
///
/// The record store is seeded first, so the ingest listener never sees a
/// missing file. The listeners share nothing but the datagram address.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = RecordStore::new(&config.data_file);
    store
        .init()
        .await
        .with_context(|| format!("failed to initialize {}", config.data_file.display()))?;

    let (writer, _writer_handle) = StoreWriter::spawn(store);

    let ingest = IngestListener::bind(config.ingest_address(), writer)
        .await
        .with_context(|| format!("failed to bind ingest listener on {}", config.ingest_address()))?;
    let ingest_handle = tokio::spawn(ingest.run());

    let relay = SubmissionRelay::connect(config.ingest_address())
        .await
        .with_context(|| format!("failed to resolve ingest address {}", config.ingest_address()))?;
    let router = RequestRouter::new(Arc::new(relay), &config.public_dir);

    let server = HttpServer::bind(config.http_address(), router)
        .await
        .with_context(|| format!("failed to bind HTTP server on {}", config.http_address()))?;
    let server_handle = tokio::spawn(server.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    server_handle.abort();
    ingest_handle.abort();

    Ok(())
}
