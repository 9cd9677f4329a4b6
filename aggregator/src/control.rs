//! The operator side channel: each `AGGREGATE` command triggers one
//! aggregation and the new model is written back, length prefixed.

use std::{io, sync::Arc};

use log::{error, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::AggregatorService;

/// The literal command that triggers an aggregation.
pub const AGGREGATE: &[u8; 9] = b"AGGREGATE";

/// Reads the next command, skipping any whitespace in front of it.
///
/// # Returns
/// `None` once the input is exhausted.
async fn next_command<R: AsyncRead + Unpin>(input: &mut R) -> io::Result<Option<[u8; 9]>> {
    let mut cmd = [0; 9];

    loop {
        match input.read_u8().await {
            Ok(byte) if byte.is_ascii_whitespace() => continue,
            Ok(byte) => {
                cmd[0] = byte;
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    input.read_exact(&mut cmd[1..]).await?;
    Ok(Some(cmd))
}

/// Runs aggregation commands from `input` until it is exhausted.
///
/// Every successful aggregation writes a big-endian `u32` length followed by
/// the aggregated archive to `output`. Failed aggregations and unknown
/// commands are logged and produce no output.
pub async fn run_control<R, W>(
    service: Arc<AggregatorService>,
    mut input: R,
    mut output: W,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = next_command(&mut input).await? {
        if &cmd != AGGREGATE {
            warn!(command:? = String::from_utf8_lossy(&cmd); "unknown control command");
            continue;
        }

        let task = {
            let service = service.clone();
            tokio::task::spawn_blocking(move || service.aggregate())
        };

        let model = match task.await.map_err(io::Error::other)? {
            Ok(model) => model,
            Err(e) => {
                error!(error:% = e; "aggregation failed");
                continue;
            }
        };

        let len = u32::try_from(model.len()).map_err(io::Error::other)?;
        output.write_u32(len).await?;
        output.write_all(&model).await?;
        output.flush().await?;
    }

    Ok(())
}
