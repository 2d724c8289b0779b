use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;

use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, error};
use tokio::net::TcpListener;
use tokio::sync::watch;
use url::Url;

use crate::dispatcher::Dispatch;
use crate::request::Request;
use crate::response_template::ResponseTemplate;
use crate::session::Session;

/// Returned by the request handler to make `hyper` drop the connection without answering.
#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("The request did not match any expectation, dropping the connection")]
    Disconnect,
    #[error("Failed to read the request body: {0}")]
    Body(#[from] hyper::Error),
    #[error("Failed to parse the request target: {0}")]
    Target(#[from] url::ParseError),
}

/// The actual HTTP server responding to incoming requests according to the session
/// expectations.
pub(super) async fn run_server(
    listener: StdTcpListener,
    session: Arc<Session>,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let listener = match into_tokio_listener(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to start the mock server: {}", e);
            return;
        }
    };

    loop {
        let (stream, _) = tokio::select! {
            // Resolves when the `BareMockServer` holding the sender is dropped.
            _ = shutdown_signal.changed() => {
                debug!("Shutting down the mock server.");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept a connection: {}", e);
                    continue;
                }
            }
        };

        let session = session.clone();
        let mut shutdown_signal = shutdown_signal.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request: hyper::Request<Incoming>| {
                let session = session.clone();
                async move { handle_request(request, &session).await }
            });
            let connection =
                http1::Builder::new().serve_connection(TokioIo::new(stream), service);

            tokio::select! {
                _ = shutdown_signal.changed() => {}
                outcome = connection => {
                    if let Err(e) = outcome {
                        debug!("Connection closed: {}", e);
                    }
                }
            }
        });
    }
}

fn into_tokio_listener(listener: StdTcpListener) -> std::io::Result<TcpListener> {
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

async fn handle_request(
    request: hyper::Request<Incoming>,
    session: &Session,
) -> Result<Response<Full<Bytes>>, ServiceError> {
    let request = read_request(request).await?;

    match session.dispatch(request) {
        Dispatch::Respond { template, delay } => {
            // No lock is held at this point: a slow response does not hold back other requests.
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(template.generate_response(session.default_headers()))
        }
        Dispatch::NotFound => Ok(ResponseTemplate::new(StatusCode::NOT_FOUND)
            .generate_response(session.default_headers())),
        Dispatch::Disconnect => Err(ServiceError::Disconnect),
    }
}

/// Buffer the whole body: every pending expectation gets to look at the same bytes.
async fn read_request(request: hyper::Request<Incoming>) -> Result<Request, ServiceError> {
    let (parts, body) = request.into_parts();
    let url: Url = match parts.uri.authority() {
        Some(_) => parts.uri.to_string(),
        None => format!("http://localhost{}", parts.uri),
    }
    .parse()?;
    let body = body.collect().await?.to_bytes();

    Ok(Request {
        url,
        method: parts.method,
        headers: parts.headers,
        body: body.to_vec(),
    })
}
