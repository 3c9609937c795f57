use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::http::{read_request, write_response, HttpError, HttpResponse, StatusCode};
use crate::router::{RequestRouter, BAD_REQUEST_PAGE, PAYLOAD_TOO_LARGE_PAGE};

/// Serves requests on one client connection until the client closes it,
/// asks for it to be closed, or sends something that cannot be parsed.
pub async fn handle_client_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    router: Arc<RequestRouter>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_request(&mut reader).await {
            Ok(request) => request,
            Err(HttpError::ConnectionClosed) => break,
            Err(HttpError::Io(e)) => {
                tracing::debug!(%client_address, error = %e, "error reading request");
                break;
            }
            Err(e) => {
                tracing::warn!(%client_address, error = %e, "rejecting unreadable request");

                let response = match e {
                    HttpError::BodyTooLarge | HttpError::HeadTooLarge => {
                        HttpResponse::html(StatusCode::PayloadTooLarge, PAYLOAD_TOO_LARGE_PAGE)
                    }
                    _ => HttpResponse::html(StatusCode::BadRequest, BAD_REQUEST_PAGE),
                }
                .with_header("Connection", "close");

                if let Err(e) = write_response(&mut writer, &response).await {
                    tracing::debug!(%client_address, error = %e, "error writing response");
                }
                break;
            }
        };

        let response = router.route(&request).await;

        tracing::info!(
            %client_address,
            method = ?request.method,
            path = request.path(),
            status = response.status.code(),
            "request served"
        );

        if let Err(e) = write_response(&mut writer, &response).await {
            tracing::debug!(%client_address, error = %e, "error writing response");
            break;
        }

        if request.wants_close() {
            break;
        }
    }
}
