//! A small HTTP/1.1 codec: reading one request from a buffered stream and
//! encoding one response.
//!
//! Only what the router needs is supported. Request bodies are framed by
//! `Content-Length` alone; chunked transfer coding is not understood.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the request line plus all header lines.
pub const MAX_HEAD_SIZE: usize = 8 * 1024;
/// Upper bound on a request body.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Errors that can occur while reading a request from a connection.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("request head too large")]
    HeadTooLarge,
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length header")]
    InvalidContentLength,
    #[error("request body too large")]
    BodyTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

impl Method {
    fn parse(method: &str) -> Self {
        match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            _ => Method::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The request target without its query string or fragment.
    pub fn path(&self) -> &str {
        let end = self
            .target
            .find(|c| c == '?' || c == '#')
            .unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// Whether the connection should be closed once this request is answered.
    pub fn wants_close(&self) -> bool {
        match self.header("connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => true,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => false,
            _ => self.version == "HTTP/1.0",
        }
    }
}

/// Reads one request: request line, headers, then exactly `Content-Length`
/// body bytes.
///
/// A `POST` without a valid `Content-Length` is rejected, since its body
/// cannot be delimited.
///
/// # Returns
///
/// * `Ok(HttpRequest)` - A complete request
/// * `Err(HttpError::ConnectionClosed)` - The peer closed before a full request head arrived
/// * `Err(HttpError::MissingContentLength)` / `Err(HttpError::InvalidContentLength)` - The body could not be framed
pub async fn read_request<R>(reader: &mut R) -> Result<HttpRequest, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEAD_SIZE;

    let request_line = read_head_line(reader, &mut budget).await?;
    let request_line =
        String::from_utf8(request_line).map_err(|_| HttpError::MalformedRequestLine)?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::MalformedRequestLine);
    };

    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return Err(HttpError::MalformedRequestLine);
    }

    let method = Method::parse(method);
    let target = target.to_string();
    let version = version.to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_head_line(reader, &mut budget).await?;
        if line.is_empty() {
            break;
        }

        let line = String::from_utf8(line).map_err(|_| HttpError::MalformedHeader)?;

        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::MalformedHeader);
        };
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    let mut request = HttpRequest {
        method,
        target,
        version,
        headers,
        body: Bytes::new(),
    };

    let content_length = match request.header("content-length") {
        Some(value) => Some(
            value
                .parse::<usize>()
                .map_err(|_| HttpError::InvalidContentLength)?,
        ),
        None if request.method == Method::Post => return Err(HttpError::MissingContentLength),
        None => None,
    };

    if let Some(length) = content_length {
        if length > MAX_BODY_SIZE {
            return Err(HttpError::BodyTooLarge);
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        request.body = Bytes::from(body);
    }

    Ok(request)
}

/// Reads one head line as raw bytes, without its line terminator, charging
/// it against the remaining head budget.
async fn read_head_line<R>(reader: &mut R, budget: &mut usize) -> Result<Vec<u8>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    if *budget == 0 {
        return Err(HttpError::HeadTooLarge);
    }

    let mut line = Vec::new();
    let number_of_bytes = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if number_of_bytes == 0 {
        return Err(HttpError::ConnectionClosed);
    }

    if !line.ends_with(b"\n") {
        if number_of_bytes == *budget {
            return Err(HttpError::HeadTooLarge);
        }
        return Err(HttpError::ConnectionClosed);
    }

    *budget -= number_of_bytes;

    while matches!(line.last(), Some(b'\r' | b'\n')) {
        line.pop();
    }

    Ok(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Found,
    BadRequest,
    NotFound,
    PayloadTooLarge,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Found => 302,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Found => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = self.with_header("Content-Type", content_type);
        response.body = body.into();
        response
    }

    pub fn html(status: StatusCode, body: impl Into<Bytes>) -> Self {
        HttpResponse::new(status).with_body("text/html", body)
    }

    pub fn redirect(location: &str) -> Self {
        HttpResponse::new(StatusCode::Found).with_header("Location", location)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serializes the status line, headers, a `Content-Length` matching the
    /// body, and the body itself.
    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(128 + self.body.len());

        buffer.put_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason()).as_bytes(),
        );
        for (name, value) in &self.headers {
            buffer.put_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        buffer.put_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        buffer.put_slice(&self.body);

        buffer.freeze()
    }
}

pub async fn write_response<W>(writer: &mut W, response: &HttpResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.encode()).await?;
    writer.flush().await?;

    Ok(())
}
