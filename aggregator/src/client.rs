use std::io;

use comms::{
    OnoReceiver, OnoSender,
    msg::{ACK, Frame, NACK, Request},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// A connection to an aggregation service.
pub struct AggregatorClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    buf: Vec<u8>,
}

impl AggregatorClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Connects to the service listening on `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        Ok(Self::new(rx, tx))
    }
}

impl<R, W> AggregatorClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `AggregatorClient` over an established channel.
    pub fn new(rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            rx,
            tx,
            buf: Vec::new(),
        }
    }

    /// Downloads the current aggregate.
    pub async fn fetch_model(&mut self) -> io::Result<Vec<u8>> {
        self.tx.send(&Request::FetchModel).await?;
        let Frame(model) = self.rx.recv_into(&mut self.buf).await?;
        Ok(model.to_vec())
    }

    /// Hands in a candidate model.
    ///
    /// # Errors
    /// Returns an error of kind `InvalidInput` if the service refuses the
    /// model and `InvalidData` for any other reply but an acknowledgement.
    pub async fn submit_model(&mut self, model: &[u8]) -> io::Result<()> {
        self.tx.send(&Request::SubmitModel(model)).await?;
        let Frame(reply) = self.rx.recv_into(&mut self.buf).await?;

        if reply == NACK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the aggregator refused the model",
            ));
        }
        if reply != ACK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected submission reply {:?}", String::from_utf8_lossy(reply)),
            ));
        }

        Ok(())
    }
}
