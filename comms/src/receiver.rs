use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, LEN_TYPE_SIZE, LenType};

/// Reads frames, optionally refusing the ones longer than a limit.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            max_len: LenType::MAX as usize,
        }
    }

    /// Refuses frames whose body is longer than `max_len` bytes.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Reads the next frame into `buf` and decodes it.
    ///
    /// # Arguments
    /// * `buf` - Holds the frame body, the decoded `T` may borrow from it.
    ///
    /// # Errors
    /// `UnexpectedEof` if the peer closes before or inside a frame,
    /// `InvalidData` if the frame is over the limit or `T` rejects it. An
    /// oversized body is never read, so the stream is unusable afterwards.
    pub async fn recv_into<'buf, T>(&mut self, buf: &'buf mut Vec<u8>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
    {
        let mut header = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut header).await?;

        let len = LenType::from_be_bytes(header) as usize;
        if len > self.max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the {} byte limit", self.max_len),
            ));
        }

        buf.clear();
        buf.resize(len, 0);
        self.rx.read_exact(buf).await?;

        T::deserialize(buf)
    }

    pub fn into_inner(self) -> R {
        self.rx
    }
}
