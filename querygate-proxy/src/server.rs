//! TCP accept loop and per-connection HTTP serving.
//!
//! Each accepted connection gets its own task running hyper's auto
//! (HTTP/1.1 + HTTP/2) connection builder around the logged proxy service.
//! There is no drain phase: once `shutdown` fires, the loop stops accepting
//! and returns, and in-flight connections die with the process.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder};
use tracing::{debug, error, info, warn};

use crate::error::ProxyError;
use crate::logging_layer::logging_layer;
use crate::proxy_config::GatewayConfig;
use crate::proxy_service::ProxyService;

/// Accept connections on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Only listener-level failures (reading the local address) are returned.
/// Individual accept errors are logged and the loop continues.
pub async fn serve(
    listener: TcpListener,
    service: ProxyService,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    let config = service.config().clone();
    let service_stack = ServiceBuilder::new()
        .layer(logging_layer())
        .service(service);

    info!(addr = %local_addr, "Proxy listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        if let Err(e) = configure_tcp_stream(&stream, &config) {
                            warn!(peer = %peer_addr, error = %e, "Failed to configure TCP socket");
                        }

                        let service_stack = service_stack.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, service_stack).await {
                                error!(error = %e, "Connection handling error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }

            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, stopping accept loop");
                return Ok(());
            }
        }
    }
}

/// Serve one connection, converting service errors into HTTP responses.
pub async fn handle_connection<S, B>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: S,
) -> Result<(), ProxyError>
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = ProxyError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    B: http_body::Body<Data = bytes::Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let io = TokioIo::new(stream);

    let svc_fn = hyper::service::service_fn(move |req| {
        let mut svc = service.clone();
        async move {
            let result: Result<_, std::convert::Infallible> = match svc.call(req).await {
                Ok(response) => Ok(response.map(|body| {
                    body.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.into() })
                        .boxed()
                })),
                Err(e) => {
                    error!(error = %e, status = e.status().as_u16(), "Service error");
                    Ok(e.to_response()
                        .map(|body| body.map_err(|e| match e {}).boxed()))
                }
            };
            result
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    if let Err(e) = builder.serve_connection_with_upgrades(io, svc_fn).await {
        debug!(peer = %peer_addr, error = %e, "Connection closed with error");
    }

    Ok(())
}

/// Apply TCP_NODELAY and keepalive to an accepted socket.
fn configure_tcp_stream(stream: &TcpStream, config: &GatewayConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);
    let keepalive =
        socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.tcp_keepalive_secs));
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}
