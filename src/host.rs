//! JSON-lines bridge between a host process and a session.
//!
//! Each input line is one [`Command`]; each output line is one notification
//! envelope. End of input shuts the session down; the bridge returns once
//! the session has stopped and every notification it published has been
//! written.

use std::pin::pin;

use anyhow::{Context, Result};
use cf_core::events::Envelope;
use cf_core::protocol::Command;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::session::{Session, SessionHandle};

/// Relay commands from `input` into `session` and its notifications out to
/// `output` until the session stops.
pub async fn relay<R, W>(session: Session, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let handle = session.handle();
    let mut notifications = handle.subscribe();
    let mut lines = input.lines();
    let mut input_open = true;
    let mut stopped = pin!(session.join());

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("reading host input")? {
                    Some(line) => forward(&handle, &line).await,
                    None => {
                        debug!("Host input closed; shutting down session");
                        input_open = false;
                        // Worker may already be gone.
                        let _ = handle.shutdown().await;
                    }
                }
            }
            received = notifications.recv() => match received {
                Ok(envelope) => write_envelope(&mut output, &envelope).await?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Host output fell behind; notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
            result = &mut stopped => {
                result.context("session worker")?;
                break;
            }
        }
    }

    drain(&mut notifications, &mut output).await?;
    output.flush().await.context("flushing host output")?;
    Ok(())
}

async fn forward(handle: &SessionHandle, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Command>(line) {
        Ok(command) => {
            debug!(?command, "Host command");
            if handle.send(command).await.is_err() {
                warn!("Session closed; dropping host command");
            }
        }
        Err(e) => warn!(error = %e, line, "Ignoring malformed host command"),
    }
}

async fn drain<W>(notifications: &mut broadcast::Receiver<Envelope>, output: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match notifications.try_recv() {
            Ok(envelope) => write_envelope(output, &envelope).await?,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Notifications dropped while draining");
            }
            Err(_) => return Ok(()),
        }
    }
}

async fn write_envelope<W>(output: &mut W, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(envelope).context("encoding notification")?;
    line.push(b'\n');
    output.write_all(&line).await.context("writing host output")?;
    output.flush().await.context("flushing host output")?;
    Ok(())
}
