use std::{future::IntoFuture, time::Duration};

use axum::Router;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::ServeError;

/// Serves `router` on `listener` until `shutdown` is cancelled.
///
/// Once cancelled no new connections are accepted and in-flight requests get
/// up to `grace` to complete.
///
/// # Errors
/// Returns `ServeError::ShutdownTimeout` if requests are still running when
/// the grace period ends, or the listener's io error.
pub async fn serve_until(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), ServeError> {
    let addr = listener.local_addr()?;
    info!(addr:% = addr; "listening");

    let stopping = shutdown.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { stopping.cancelled().await })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        res = &mut server => return Ok(res?),
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(res) => {
            info!(addr:% = addr; "stopped");
            Ok(res?)
        }
        Err(_) => {
            warn!(addr:% = addr; "shutdown grace period exceeded");
            Err(ServeError::ShutdownTimeout(grace))
        }
    }
}
