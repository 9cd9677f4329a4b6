use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// Writes one frame per message.
pub struct OnoSender<W: AsyncWrite + Unpin> {
    tx: W,
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self { tx, head: Vec::new() }
    }

    /// Frames and writes `msg`, then flushes.
    ///
    /// The bytes a message serializes into the head go out right after the
    /// length header, the slice it hands back (a model archive, typically)
    /// is written straight from the caller's memory.
    ///
    /// # Errors
    /// `InvalidInput` if the body is longer than `u32::MAX` bytes, nothing is
    /// written in that case. Otherwise the writer's io error.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { head, tx } = self;

        head.clear();
        head.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let body = msg.serialize(head);
        let body_len = body.map_or(0, <[u8]>::len);
        let len = head.len() - LEN_TYPE_SIZE + body_len;

        let Ok(len) = LenType::try_from(len) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame body of {len} bytes does not fit the length header"),
            ));
        };
        head[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());

        tx.write_all(head).await?;
        if let Some(body) = body {
            tx.write_all(body).await?;
        }
        tx.flush().await
    }

    pub fn into_inner(self) -> W {
        self.tx
    }
}
