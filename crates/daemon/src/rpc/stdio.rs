use anyhow::{Context, Result};
use draftsync_common::protocol::jsonrpc::Request;
use draftsync_common::protocol::rpc_methods;
use draftsync_common::types::WorkingCopyUpdated;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::rpc::methods::{handle_raw_request, RpcServerState};
use crate::transmit::OutboundNotification;

/// Serve one editor endpoint over a pair of byte streams (stdin/stdout).
///
/// Framing is newline-delimited JSON. Each request line yields at most one
/// response line; outbound notifications and `WorkingCopyUpdated` events are
/// interleaved as notification lines. Returns on EOF or shutdown.
pub async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    state: RpcServerState,
    mut outbound: mpsc::Receiver<OutboundNotification>,
    updates: broadcast::Receiver<WorkingCopyUpdated>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut updates = Some(updates);
    // Survives cancelled reads: read_until keeps partial input here.
    let mut request_line = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),

            read = reader.read_until(b'\n', &mut request_line) => {
                let bytes_read = read.context("failed to read json-rpc request")?;
                if bytes_read == 0 {
                    return Ok(());
                }

                trim_line_endings(&mut request_line);
                if !request_line.iter().all(|byte| byte.is_ascii_whitespace()) {
                    if let Some(response) = handle_raw_request(&request_line, &state).await {
                        write_line(&mut writer, &response).await?;
                    }
                }
                request_line.clear();
            }

            Some(notification) = outbound.recv() => {
                if notification.endpoint_id == state.endpoint_id() {
                    write_line(&mut writer, &notification.notification).await?;
                } else {
                    warn!(
                        endpoint_id = %notification.endpoint_id,
                        "notification for unknown endpoint"
                    );
                }
            }

            update = next_update(&mut updates) => {
                if let Some(update) = update {
                    let params = serde_json::to_value(&update)
                        .context("failed to serialize working copy update")?;
                    let notification =
                        Request::notification(rpc_methods::WORKING_COPY_UPDATED, Some(params));
                    write_line(&mut writer, &notification).await?;
                }
            }
        }
    }
}

/// Next update event; `None` after a lag. Pends forever once the channel closes.
async fn next_update(
    updates: &mut Option<broadcast::Receiver<WorkingCopyUpdated>>,
) -> Option<WorkingCopyUpdated> {
    let Some(receiver) = updates.as_mut() else {
        return std::future::pending().await;
    };
    match receiver.recv().await {
        Ok(update) => Some(update),
        Err(RecvError::Lagged(skipped)) => {
            warn!(skipped, "working copy update stream lagged");
            None
        }
        Err(RecvError::Closed) => {
            *updates = None;
            None
        }
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).context("failed to serialize json-rpc message")?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await.context("failed to write json-rpc message")?;
    writer.flush().await.context("failed to flush json-rpc message")?;
    Ok(())
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}
