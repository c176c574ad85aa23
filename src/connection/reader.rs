//! The background reader task.
//!
//! One long-lived task owns the read half of the stream. It reads a type
//! byte, parses the message body, and delivers the parsed message to the
//! configured sink with a cancellation-aware send, preserving wire
//! order. On cancellation, EOF, or any unrecoverable error it cancels
//! the connection token and shuts the stream down.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ErrorKind, Result, RfbError};
use crate::message::server::{read_server_message, ServerMessage};
use crate::session::Session;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Spawns the reader task for an established connection.
///
/// The task takes sole ownership of the message sender; dropping it on
/// exit closes the outbound queue so the caller observes the shutdown.
pub(crate) fn spawn<R>(
    read_half: R,
    session: Arc<Session>,
    config: Arc<ClientConfig>,
    message_tx: Option<mpsc::Sender<ServerMessage>>,
    cancel: CancellationToken,
    writer: Arc<Mutex<BoxedWriter>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        run(read_half, session, config, message_tx, cancel.clone(), writer).await;
    })
}

async fn run<R>(
    mut reader: R,
    session: Arc<Session>,
    config: Arc<ClientConfig>,
    message_tx: Option<mpsc::Sender<ServerMessage>>,
    cancel: CancellationToken,
    writer: Arc<Mutex<BoxedWriter>>,
) where
    R: AsyncRead + Unpin + Send,
{
    info!("reader task started");

    loop {
        // The idle wait for the next message is unbounded; the read
        // deadline applies once a message body is being parsed.
        let msg_type = tokio::select! {
            _ = cancel.cancelled() => {
                info!("reader task cancelled");
                break;
            }
            result = reader.read_u8() => match result {
                Ok(msg_type) => msg_type,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("connection closed by server");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read message type");
                    break;
                }
            }
        };
        trace!(msg_type, "received server message");

        let parsed = tokio::select! {
            _ = cancel.cancelled() => {
                info!("reader task cancelled mid-message");
                break;
            }
            result = parse_body(&session, msg_type, &mut reader, &config) => result,
        };

        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                log_terminal_error(msg_type, &e);
                break;
            }
        };
        config.metrics.incr_counter("rfb.server_messages", 1);

        let Some(tx) = &message_tx else {
            trace!("no server message channel configured, discarding message");
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("reader task cancelled while delivering message");
                break;
            }
            result = tx.send(message) => {
                if result.is_err() {
                    warn!("server message channel closed, stopping reader");
                    break;
                }
            }
        }
    }

    // The reader owns connection teardown: signal every pending
    // operation and close the write half.
    cancel.cancel();
    let mut writer = writer.lock().await;
    let _ = writer.shutdown().await;
    info!("reader task ended");
}

async fn parse_body<R>(
    session: &Session,
    msg_type: u8,
    reader: &mut R,
    config: &ClientConfig,
) -> Result<ServerMessage>
where
    R: AsyncRead + Unpin + Send,
{
    match config.read_timeout {
        Some(deadline) => {
            match tokio::time::timeout(
                deadline,
                read_server_message(session, msg_type, reader, &config.server_message_decoders),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RfbError::timeout(
                    "read_server_message",
                    "read deadline elapsed while parsing message",
                )),
            }
        }
        None => read_server_message(session, msg_type, reader, &config.server_message_decoders).await,
    }
}

fn log_terminal_error(msg_type: u8, err: &RfbError) {
    match err.kind() {
        ErrorKind::Network => debug!(msg_type, error = %err, "connection error, stopping reader"),
        ErrorKind::Timeout => info!(msg_type, error = %err, "read cancelled or timed out"),
        _ => error!(msg_type, error = %err, "failed to parse server message"),
    }
}
