#![allow(dead_code)]

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use form_relay::{
    ingest::IngestListener,
    record_store::{RecordStore, Records},
    relay::SubmissionRelay,
    router::RequestRouter,
    server::HttpServer,
    stats::{IngestStats, RelayStats},
    store_writer::StoreWriter,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout, Instant},
};

pub const INDEX_HTML: &str = "<html><body>index</body></html>";
pub const MESSAGE_HTML: &str = "<html><body>message</body></html>";
pub const ERROR_HTML: &str = "<html><body>not found</body></html>";

/// A response read back off the wire.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Temp directory holding a seeded record store and a public directory
/// with the three fixed pages.
pub struct TestDirs {
    pub dir: TempDir,
    pub data_file: PathBuf,
    pub public_dir: PathBuf,
}

impl TestDirs {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data_file = dir.path().join("storage").join("data.json");
        let public_dir = dir.path().join("public");

        tokio::fs::create_dir_all(&public_dir).await.unwrap();
        tokio::fs::write(public_dir.join("index.html"), INDEX_HTML)
            .await
            .unwrap();
        tokio::fs::write(public_dir.join("message.html"), MESSAGE_HTML)
            .await
            .unwrap();
        tokio::fs::write(public_dir.join("error.html"), ERROR_HTML)
            .await
            .unwrap();

        RecordStore::new(&data_file).init().await.unwrap();

        Self {
            dir,
            data_file,
            public_dir,
        }
    }

    pub fn store(&self) -> RecordStore {
        RecordStore::new(&self.data_file)
    }
}

/// Both listeners running on ephemeral ports against a temp store.
pub struct TestEnv {
    pub dirs: TestDirs,
    pub http_addr: SocketAddr,
    pub ingest_addr: SocketAddr,
    pub ingest_stats: Arc<IngestStats>,
    pub relay_stats: Arc<RelayStats>,
}

impl TestEnv {
    pub async fn start() -> Self {
        let dirs = TestDirs::new().await;

        let (writer, _) = StoreWriter::spawn(dirs.store());
        let ingest = IngestListener::bind("127.0.0.1:0", writer).await.unwrap();
        let ingest_addr = ingest.local_addr().unwrap();
        let ingest_stats = ingest.stats();
        tokio::spawn(ingest.run());

        let relay = SubmissionRelay::connect(ingest_addr).await.unwrap();
        let relay_stats = relay.stats();
        let router = RequestRouter::new(Arc::new(relay), &dirs.public_dir);

        let server = HttpServer::bind("127.0.0.1:0", router).await.unwrap();
        let http_addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        Self {
            dirs,
            http_addr,
            ingest_addr,
            ingest_stats,
            relay_stats,
        }
    }

    pub async fn get(&self, path: &str) -> RawResponse {
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        TestUtils::send_raw_request(self.http_addr, request.as_bytes()).await
    }

    pub async fn post_form(&self, path: &str, body: &str) -> RawResponse {
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            body.len(),
            body
        );
        TestUtils::send_raw_request(self.http_addr, request.as_bytes()).await
    }
}

pub struct TestUtils;

impl TestUtils {
    /// Writes a raw request, reads until the server closes, and parses the
    /// single response.
    pub async fn send_raw_request(address: SocketAddr, request: &[u8]) -> RawResponse {
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.flush().await.unwrap();

        let mut raw = Vec::new();
        timeout(Duration::from_secs(2), stream.read_to_end(&mut raw))
            .await
            .expect("response timed out")
            .unwrap();

        TestUtils::parse_response(&raw)
    }

    pub fn parse_response(raw: &[u8]) -> RawResponse {
        let head_end = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .expect("response has no header terminator");

        let head = std::str::from_utf8(&raw[..head_end]).unwrap();
        let mut lines = head.split("\r\n");

        let status_line = lines.next().unwrap();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse::<u16>()
            .unwrap();

        let headers = lines
            .map(|line| {
                let (name, value) = line.split_once(':').unwrap();
                (name.trim().to_string(), value.trim().to_string())
            })
            .collect();

        RawResponse {
            status,
            headers,
            body: raw[head_end + 4..].to_vec(),
        }
    }

    /// Polls the store until it holds `count` records or two seconds pass.
    pub async fn wait_for_records(store: &RecordStore, count: usize) -> Records {
        let deadline = Instant::now() + Duration::from_secs(2);

        loop {
            let records = store.load().await.unwrap();
            if records.len() >= count || Instant::now() > deadline {
                return records;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    /// Polls `condition` until it holds or two seconds pass.
    pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);

        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            sleep(Duration::from_millis(20)).await;
        }

        true
    }
}
