//! Per-client control session.
//!
//! Reads command lines, forwards them to the service task and writes the
//! reply. Event lines from the broadcast channel are interleaved between
//! replies as they arrive.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;

use crate::control::{self, Command};
use crate::server::ServiceHandle;

/// Longest accepted command line in bytes.
const MAX_LINE_LEN: usize = 8192;

pub async fn handle(stream: TcpStream, service: ServiceHandle) -> Result<()> {
    let peer = stream.peer_addr()?;
    tracing::info!(%peer, "New control session");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut events = service.events.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if line.len() > MAX_LINE_LEN {
                    tracing::warn!(%peer, len = line.len(), "Line too long, dropping");
                    let err = simplecm::TpError::invalid_argument("Line too long");
                    write_line(&mut writer, &control::error_reply(&err.to_wire())).await?;
                    continue;
                }
                let reply = match Command::parse(&line) {
                    Ok(Command::Quit) => {
                        write_line(&mut writer, &control::ok_reply(serde_json::json!({}))).await?;
                        break;
                    }
                    Ok(command) => service.call(command).await?,
                    Err(e) => control::error_reply(&e.to_wire()),
                };
                write_line(&mut writer, &reply).await?;
            }
            event = events.recv() => match event {
                Ok(line) => write_line(&mut writer, &line).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%peer, skipped, "Session lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    tracing::info!(%peer, "Control session closed");
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
