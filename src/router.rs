use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::form::percent_decode;
use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
use crate::relay::{RelayError, SubmissionRelay};

pub const INDEX_PAGE: &str = "index.html";
pub const MESSAGE_PAGE: &str = "message.html";
pub const ERROR_PAGE: &str = "error.html";

const FALLBACK_NOT_FOUND_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Not Found</title></head><body><h1>404 Not Found</h1></body></html>";
pub(crate) const BAD_REQUEST_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Bad Request</title></head><body><h1>400 Bad Request</h1><p>The submitted form could not be read.</p></body></html>";
pub(crate) const PAYLOAD_TOO_LARGE_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Payload Too Large</title></head><body><h1>413 Payload Too Large</h1></body></html>";
const INTERNAL_ERROR_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Server Error</title></head><body><h1>500 Internal Server Error</h1></body></html>";
const NOT_IMPLEMENTED_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Not Implemented</title></head><body><h1>501 Not Implemented</h1></body></html>";

/// Dispatches each request by method and path.
///
/// | Request          | Handling                                        |
/// |------------------|-------------------------------------------------|
/// | `POST <any>`     | relay the form body, `302` to `/`               |
/// | `GET /`          | `index.html`                                    |
/// | `GET /message`   | `message.html`                                  |
/// | `GET <other>`    | file under the public directory, else `404`     |
/// | anything else    | `501`                                           |
#[derive(Debug)]
pub struct RequestRouter {
    relay: Arc<SubmissionRelay>,
    public_dir: PathBuf,
}

impl RequestRouter {
    pub fn new(relay: Arc<SubmissionRelay>, public_dir: impl Into<PathBuf>) -> Self {
        RequestRouter {
            relay,
            public_dir: public_dir.into(),
        }
    }

    pub async fn route(&self, request: &HttpRequest) -> HttpResponse {
        match (request.method, request.path()) {
            (Method::Post, _) => self.submit(&request.body).await,
            (Method::Get, "/") => self.serve_page(INDEX_PAGE).await,
            (Method::Get, "/message") => self.serve_page(MESSAGE_PAGE).await,
            (Method::Get, path) => self.serve_static(path).await,
            (Method::Other, _) => HttpResponse::html(StatusCode::NotImplemented, NOT_IMPLEMENTED_PAGE),
        }
    }

    async fn submit(&self, body: &[u8]) -> HttpResponse {
        match self.relay.relay(body).await {
            Ok(()) => HttpResponse::redirect("/"),
            Err(RelayError::MalformedBody(e)) => {
                tracing::warn!(error = %e, "rejecting malformed submission");
                HttpResponse::html(StatusCode::BadRequest, BAD_REQUEST_PAGE)
            }
            Err(e @ RelayError::PayloadTooLarge { .. }) => {
                tracing::warn!(error = %e, "rejecting oversized submission");
                HttpResponse::html(StatusCode::PayloadTooLarge, PAYLOAD_TOO_LARGE_PAGE)
            }
            Err(e @ RelayError::Serialize(_)) => {
                tracing::error!(error = %e, "failed to relay submission");
                HttpResponse::html(StatusCode::InternalServerError, INTERNAL_ERROR_PAGE)
            }
        }
    }

    async fn serve_page(&self, page: &str) -> HttpResponse {
        match fs::read(self.public_dir.join(page)).await {
            Ok(contents) => HttpResponse::html(StatusCode::Ok, contents),
            Err(e) => {
                tracing::warn!(page, error = %e, "page unavailable");
                self.not_found().await
            }
        }
    }

    async fn serve_static(&self, path: &str) -> HttpResponse {
        let Some(file_path) = self.resolve_static(path) else {
            return self.not_found().await;
        };

        match fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return self.not_found().await,
        }

        match fs::read(&file_path).await {
            Ok(contents) => HttpResponse::new(StatusCode::Ok)
                .with_body(content_type_for(&file_path), contents),
            Err(e) => {
                tracing::warn!(path = %file_path.display(), error = %e, "failed to read static file");
                self.not_found().await
            }
        }
    }

    /// Maps a request path onto the public directory. Paths that would
    /// leave it are refused.
    fn resolve_static(&self, path: &str) -> Option<PathBuf> {
        let decoded = percent_decode(path, false).ok()?;
        let relative = Path::new(decoded.trim_start_matches('/'));

        let stays_inside = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if relative.as_os_str().is_empty() || !stays_inside {
            return None;
        }

        Some(self.public_dir.join(relative))
    }

    async fn not_found(&self) -> HttpResponse {
        let body = match fs::read(self.public_dir.join(ERROR_PAGE)).await {
            Ok(contents) => contents,
            Err(_) => FALLBACK_NOT_FOUND_PAGE.as_bytes().to_vec(),
        };

        HttpResponse::html(StatusCode::NotFound, body)
    }
}

/// Guesses a content type from the file extension, falling back to
/// `text/plain`.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/vnd.microsoft.icon",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "text/plain",
    }
}
