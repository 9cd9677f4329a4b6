use std::{io, sync::Arc};

use comms::{
    OnoReceiver, OnoSender,
    msg::{ACK, Frame, NACK, Request},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::AggregatorService;

/// Answers the requests of one client until it disconnects.
///
/// # Arguments
/// * `service` - The shared aggregation state.
/// * `rx` - The receiving end of the communication.
/// * `tx` - The sending end of the communication.
///
/// # Errors
/// Returns an `io::Error` on a malformed request or a broken connection, a
/// clean disconnect between requests is not an error.
pub async fn serve_connection<R, W>(
    service: Arc<AggregatorService>,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        let req = match rx.recv_into(&mut buf).await {
            Ok(req) => req,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        match req {
            Request::FetchModel => {
                let model = service.current();
                tx.send(&Frame(&model)).await?;
            }
            Request::SubmitModel(model) => match service.submit(model.to_vec()) {
                Ok(()) => tx.send(&Frame(ACK)).await?,
                Err(e) => {
                    warn!(error:% = e; "submission refused");
                    tx.send(&Frame(NACK)).await?;
                }
            },
        }
    }
}

/// The largest request body a connection accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Accepts clients on `listener` until `shutdown` is cancelled, each one is
/// served by its own task.
///
/// # Arguments
/// * `listener` - Where clients connect.
/// * `service` - The shared aggregation state.
/// * `max_frame_len` - Requests with a longer body close their connection.
/// * `shutdown` - Stops accepting and aborts the open connections.
pub async fn run(
    listener: TcpListener,
    service: Arc<AggregatorService>,
    max_frame_len: usize,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let mut tasks = JoinSet::new();
    info!(addr:% = listener.local_addr()?; "aggregator listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                debug!(peer:% = addr; "client connected");

                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);
                let rx = rx.with_max_len(max_frame_len);
                tasks.spawn(serve_connection(service.clone(), rx, tx));
            }
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                match res {
                    Ok(Err(e)) => warn!(error:% = e; "connection closed with an error"),
                    Err(e) => warn!(error:% = e; "connection task failed"),
                    Ok(Ok(())) => {}
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    tasks.shutdown().await;
    Ok(())
}
