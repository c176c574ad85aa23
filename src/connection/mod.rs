//! The client connection: ownership of the byte stream, the handshake
//! entry point, and the client-to-server message methods.
//!
//! A [`Connection`] exclusively owns the underlying stream. After the
//! handshake succeeds the stream is split: the read half moves into the
//! spawned reader task, and the write half lives behind a write lock so
//! concurrent client messages are serialized and their bytes never
//! interleave on the wire.

pub(crate) mod handshake;
pub(crate) mod reader;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ClientConfig;
use crate::encoding::EncodingType;
use crate::error::{Result, RfbError};
use crate::message::client;
use crate::message::client::ButtonMask;
use crate::pixel::PixelFormat;
use crate::session::Session;
use crate::validation::{
    sanitize_text, validate_keysym, validate_pointer_position, validate_text, MAX_CLIPBOARD_LEN,
    MAX_ENCODINGS,
};

/// The stream types the engine can drive: any connected, byte-oriented
/// duplex stream.
pub trait RfbStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RfbStream for T {}

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// An established VNC client connection.
///
/// Safe to share across tasks: all client-message methods take `&self`
/// and serialize on the internal write lock.
pub struct Connection {
    writer: Arc<Mutex<BoxedWriter>>,
    session: Arc<Session>,
    config: Arc<ClientConfig>,
    cancel: CancellationToken,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Drives the handshake on `stream` and, on success, starts the
    /// background reader task.
    ///
    /// Any handshake failure closes the stream and returns the
    /// categorized error; no partially initialized connection escapes.
    pub async fn establish<S>(stream: S, config: ClientConfig) -> Result<Self>
    where
        S: RfbStream + 'static,
    {
        Connection::establish_with_cancel(stream, config, CancellationToken::new()).await
    }

    /// Like [`Connection::establish`], with a caller-provided
    /// cancellation token that every read, write and queue send of this
    /// connection will observe.
    pub async fn establish_with_cancel<S>(
        stream: S,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        S: RfbStream + 'static,
    {
        let mut config = config;
        // The reader task takes sole ownership of the sender so the
        // channel closes when the reader exits.
        let message_tx = config.server_message_tx.take();
        let config = Arc::new(config);
        let session = Arc::new(Session::new());
        let mut stream = stream;

        let handshake_result = match config.connect_timeout {
            Some(deadline) => {
                match tokio::time::timeout(
                    deadline,
                    handshake::perform(&mut stream, &config, &session, &cancel),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RfbError::timeout("handshake", "connect timeout elapsed")),
                }
            }
            None => handshake::perform(&mut stream, &config, &session, &cancel).await,
        };

        if let Err(err) = handshake_result {
            let _ = stream.shutdown().await;
            return Err(err);
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let writer: Arc<Mutex<BoxedWriter>> = Arc::new(Mutex::new(Box::new(write_half)));
        let handle = reader::spawn(
            read_half,
            Arc::clone(&session),
            Arc::clone(&config),
            message_tx,
            cancel.clone(),
            Arc::clone(&writer),
        );

        Ok(Connection {
            writer,
            session,
            config,
            cancel,
            reader_task: Mutex::new(Some(handle)),
        })
    }

    /// The shared session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A clone of the connection's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the connection has been cancelled or torn down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the connection, waits for the reader task to exit, and
    /// shuts the stream down.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.reader_task.lock().await.take() {
            let _ = handle.await;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Sends SetPixelFormat and resets the color map on success.
    pub async fn set_pixel_format(&self, format: &PixelFormat) -> Result<()> {
        format.validate()?;
        let frame = client::set_pixel_format(format);
        self.send_frame("set_pixel_format", &frame).await?;
        self.session.set_pixel_format(*format).await;
        Ok(())
    }

    /// Sends SetEncodings and records the advertised list in the
    /// session.
    pub async fn set_encodings(&self, encodings: &[EncodingType]) -> Result<()> {
        const OP: &str = "set_encodings";

        if encodings.len() > MAX_ENCODINGS {
            return Err(RfbError::validation(
                OP,
                format!("too many encodings: {} (max {MAX_ENCODINGS})", encodings.len()),
            ));
        }
        let frame = client::set_encodings(encodings);
        self.send_frame(OP, &frame).await?;
        self.session.set_encodings(encodings.to_vec()).await;
        Ok(())
    }

    /// Requests a framebuffer update for a region.
    ///
    /// With `incremental` set the server sends only changed pixels.
    pub async fn framebuffer_update_request(
        &self,
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<()> {
        let frame = client::framebuffer_update_request(incremental, x, y, width, height);
        self.send_frame("framebuffer_update_request", &frame).await
    }

    /// Sends a key press or release identified by an X11 keysym.
    pub async fn key_event(&self, keysym: u32, down: bool) -> Result<()> {
        validate_keysym(keysym)?;
        let frame = client::key_event(down, keysym);
        self.send_frame("key_event", &frame).await
    }

    /// Sends pointer position and button state.
    pub async fn pointer_event(&self, mask: ButtonMask, x: u16, y: u16) -> Result<()> {
        let (fb_width, fb_height) = self.session.dimensions().await;
        validate_pointer_position(x, y, fb_width, fb_height)?;
        let frame = client::pointer_event(mask, x, y);
        self.send_frame("pointer_event", &frame).await
    }

    /// Sends clipboard text to the server.
    ///
    /// The text must fit the protocol's Latin-1 repertoire; control
    /// characters other than `\t\n\r` are replaced before transmission.
    pub async fn cut_text(&self, text: &str) -> Result<()> {
        const OP: &str = "cut_text";

        validate_text(text, MAX_CLIPBOARD_LEN as usize)?;
        let sanitized = sanitize_text(text);
        if sanitized != text {
            warn!(
                original_length = text.len(),
                sanitized_length = sanitized.len(),
                "clipboard text was sanitized"
            );
        }

        let mut latin1 = Vec::with_capacity(sanitized.len());
        for ch in sanitized.chars() {
            let code = u32::from(ch);
            if code > 0xFF {
                return Err(RfbError::validation(
                    OP,
                    format!("character {ch:?} is not valid Latin-1"),
                ));
            }
            latin1.push(code as u8);
        }

        let frame = client::client_cut_text(&latin1);
        self.send_frame(OP, &frame).await
    }

    /// Writes one frame atomically under the write lock.
    async fn send_frame(&self, op: &'static str, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(RfbError::timeout(op, "connection closed"));
            }
            result = write_with_deadline(&mut writer, frame, self.config.write_timeout) => result,
        };

        match result {
            Ok(()) => {
                self.config.metrics.incr_counter("rfb.client_messages_sent", 1);
                Ok(())
            }
            Err(WriteError::Timeout) => Err(RfbError::timeout(op, "write timeout elapsed")),
            Err(WriteError::Io(e)) => Err(RfbError::io(op, e)),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

enum WriteError {
    Timeout,
    Io(std::io::Error),
}

async fn write_with_deadline(
    writer: &mut BoxedWriter,
    frame: &[u8],
    deadline: Option<Duration>,
) -> std::result::Result<(), WriteError> {
    let write = async {
        writer.write_all(frame).await?;
        writer.flush().await
    };
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, write).await {
            Ok(result) => result.map_err(WriteError::Io),
            Err(_) => Err(WriteError::Timeout),
        },
        None => write.await.map_err(WriteError::Io),
    }
}
