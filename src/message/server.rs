//! Server-to-client message parsing (RFC 6143 §7.6).
//!
//! Messages are dispatched on their leading type byte. The framebuffer
//! update parser validates every rectangle against the session state and
//! hands each one to the encoding layer; pseudo-encodings then get their
//! `handle` pass, which is the only place the reader task mutates
//! session state.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::color::Color;
use crate::encoding::{decode_rectangle, EncoderTable, Encoding, RectHeader, Rectangle};
use crate::error::{ErrorKind, Result, RfbError};
use crate::session::Session;
use crate::validation::{
    sanitize_text, validate_color_map_range, validate_encoding_type, validate_message_length,
    validate_rectangle, MAX_RECTANGLES_PER_UPDATE, MAX_SERVER_CLIPBOARD_LEN,
};

/// Message type: FramebufferUpdate.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
/// Message type: SetColorMapEntries.
pub const SERVER_MSG_SET_COLOR_MAP_ENTRIES: u8 = 1;
/// Message type: Bell.
pub const SERVER_MSG_BELL: u8 = 2;
/// Message type: ServerCutText.
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

/// A parsed server-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// One or more decoded framebuffer rectangles, in wire order.
    FramebufferUpdate(Vec<Rectangle>),
    /// Replacement of consecutive color map entries.
    SetColorMapEntries {
        /// Index of the first replaced entry.
        first_color: u16,
        /// The replacement colors.
        colors: Vec<Color>,
    },
    /// Audible bell request.
    Bell,
    /// Clipboard text from the server, sanitized.
    ServerCutText(String),
    /// Payload produced by a custom [`ServerMessageDecoder`].
    Custom {
        /// The message type byte the decoder was registered for.
        msg_type: u8,
        /// Decoder-defined payload.
        payload: Bytes,
    },
}

/// Decoder for additional server message types.
///
/// Registered decoders take precedence over the built-in parsers for
/// their message type, matching the reference client's override
/// semantics.
#[async_trait]
pub trait ServerMessageDecoder: Send + Sync {
    /// The message type byte this decoder handles.
    fn message_type(&self) -> u8;

    /// Parses the message body (everything after the type byte).
    async fn read(
        &self,
        session: &Session,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<ServerMessage>;
}

/// Parses one server message body, dispatching on `msg_type`.
///
/// The caller has already consumed the type byte. Unknown types with no
/// registered decoder fail with a protocol error, which terminates the
/// reader task.
pub async fn read_server_message<R: AsyncRead + Unpin + Send>(
    session: &Session,
    msg_type: u8,
    reader: &mut R,
    extra_decoders: &[Arc<dyn ServerMessageDecoder>],
) -> Result<ServerMessage> {
    if let Some(decoder) = extra_decoders.iter().find(|d| d.message_type() == msg_type) {
        trace!(msg_type, "dispatching to custom message decoder");
        let dyn_reader: &mut (dyn AsyncRead + Unpin + Send) = reader;
        return decoder.read(session, dyn_reader).await;
    }

    match msg_type {
        SERVER_MSG_FRAMEBUFFER_UPDATE => read_framebuffer_update(session, reader).await,
        SERVER_MSG_SET_COLOR_MAP_ENTRIES => read_set_color_map_entries(session, reader).await,
        SERVER_MSG_BELL => Ok(ServerMessage::Bell),
        SERVER_MSG_SERVER_CUT_TEXT => read_server_cut_text(reader).await,
        other => Err(RfbError::protocol(
            "read_server_message",
            format!("unknown server message type: {other}"),
        )),
    }
}

async fn read_framebuffer_update<R: AsyncRead + Unpin>(
    session: &Session,
    reader: &mut R,
) -> Result<ServerMessage> {
    const OP: &str = "framebuffer_update";

    let _padding = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;
    let num_rects = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
    if num_rects > MAX_RECTANGLES_PER_UPDATE {
        return Err(RfbError::protocol(
            OP,
            format!("too many rectangles in update: {num_rects} (max {MAX_RECTANGLES_PER_UPDATE})"),
        ));
    }

    let table = EncoderTable::for_session(&session.encodings().await);
    let mut rects = Vec::with_capacity(usize::from(num_rects));

    for i in 0..num_rects {
        let x = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let y = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let width = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let height = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let encoding_type = reader.read_i32().await.map_err(|e| RfbError::io(OP, e))?;

        validate_encoding_type(encoding_type)
            .map_err(|e| RfbError::protocol(OP, format!("invalid encoding type for rectangle {i}")).caused_by(e))?;

        // The snapshot is taken per rectangle so a DesktopSize earlier in
        // the same update is visible to later bounds checks.
        let ctx = session.decode_context().await;

        let is_pseudo = encoding_type < 0;
        if !is_pseudo {
            validate_rectangle(x, y, width, height, ctx.fb_width, ctx.fb_height)
                .map_err(|e| RfbError::protocol(OP, format!("invalid rectangle {i}")).caused_by(e))?;
        }

        if !table.contains(encoding_type) {
            return Err(RfbError::unsupported(
                OP,
                format!("unsupported encoding type: {encoding_type}"),
            ));
        }

        let header = RectHeader {
            x,
            y,
            width,
            height,
            encoding_type,
        };
        let encoding = decode_rectangle(&ctx, &header, reader)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::Encoding | ErrorKind::Unsupported | ErrorKind::Timeout => e,
                _ => RfbError::encoding(OP, format!("failed to decode rectangle {i}")).caused_by(e),
            })?;

        match &encoding {
            Encoding::DesktopSize(resize) => resize.handle(session).await,
            Encoding::Cursor(shape) => shape.handle(),
            _ => {}
        }

        rects.push(Rectangle {
            x,
            y,
            width,
            height,
            encoding,
        });
    }

    debug!(rectangles = rects.len(), "framebuffer update parsed");
    Ok(ServerMessage::FramebufferUpdate(rects))
}

async fn read_set_color_map_entries<R: AsyncRead + Unpin>(
    session: &Session,
    reader: &mut R,
) -> Result<ServerMessage> {
    const OP: &str = "set_color_map_entries";

    let _padding = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;
    let first_color = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
    let num_colors = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;

    validate_color_map_range(first_color, num_colors)
        .map_err(|e| RfbError::protocol(OP, "invalid color map range").caused_by(e))?;

    let mut colors = Vec::with_capacity(usize::from(num_colors));
    for _ in 0..num_colors {
        let r = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let g = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let b = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        colors.push(Color::new(r, g, b));
    }

    session.color_map().set_range(first_color, &colors)?;
    debug!(first_color, count = colors.len(), "color map entries updated");

    Ok(ServerMessage::SetColorMapEntries {
        first_color,
        colors,
    })
}

async fn read_server_cut_text<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ServerMessage> {
    const OP: &str = "server_cut_text";

    let mut padding = [0u8; 3];
    reader
        .read_exact(&mut padding)
        .await
        .map_err(|e| RfbError::io(OP, e))?;

    let length = reader.read_u32().await.map_err(|e| RfbError::io(OP, e))?;
    validate_message_length(length, MAX_SERVER_CLIPBOARD_LEN)
        .map_err(|e| RfbError::protocol(OP, "invalid clipboard text length").caused_by(e))?;

    let mut bytes = vec![0u8; length as usize];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| RfbError::io(OP, e))?;

    let text = sanitize_text(&String::from_utf8_lossy(&bytes));
    Ok(ServerMessage::ServerCutText(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodingType;
    use crate::pixel::PixelFormat;

    async fn ready_session() -> Session {
        let session = Session::new();
        session
            .install_server_init(1920, 1080, PixelFormat::rgb888(), "desk".to_string())
            .await;
        session
    }

    fn rect_header_bytes(x: u16, y: u16, w: u16, h: u16, encoding: i32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&x.to_be_bytes());
        bytes.extend_from_slice(&y.to_be_bytes());
        bytes.extend_from_slice(&w.to_be_bytes());
        bytes.extend_from_slice(&h.to_be_bytes());
        bytes.extend_from_slice(&encoding.to_be_bytes());
        bytes
    }

    fn update_prelude(num_rects: u16) -> Vec<u8> {
        let mut bytes = vec![0u8]; // padding
        bytes.extend_from_slice(&num_rects.to_be_bytes());
        bytes
    }

    #[tokio::test]
    async fn test_bell_has_no_payload() {
        let session = ready_session().await;
        let mut cursor = std::io::Cursor::new(Vec::new());
        let msg = read_server_message(&session, SERVER_MSG_BELL, &mut cursor, &[])
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::Bell);
    }

    #[tokio::test]
    async fn test_unknown_message_type() {
        let session = ready_session().await;
        let mut cursor = std::io::Cursor::new(Vec::new());
        let err = read_server_message(&session, 200, &mut cursor, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_framebuffer_update_raw_rectangle() {
        let session = ready_session().await;
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(0, 0, 2, 1, 0));
        bytes.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00]);

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap();

        let ServerMessage::FramebufferUpdate(rects) = msg else {
            panic!("expected framebuffer update");
        };
        assert_eq!(rects.len(), 1);
        let Encoding::Raw(raw) = &rects[0].encoding else {
            panic!("expected raw encoding");
        };
        assert_eq!(raw.colors[0], Color::new(255, 0, 0));
        assert_eq!(raw.colors[1], Color::new(0, 255, 0));
    }

    #[tokio::test]
    async fn test_framebuffer_update_rejects_out_of_bounds_rect() {
        let session = ready_session().await;
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(1900, 0, 101, 100, 0));

        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_framebuffer_update_accepts_rect_at_edge() {
        let session = ready_session().await;
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(1919, 1079, 1, 1, 0));
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap();
        assert!(matches!(msg, ServerMessage::FramebufferUpdate(_)));
    }

    #[tokio::test]
    async fn test_framebuffer_update_unnegotiated_encoding() {
        let session = ready_session().await;
        // Hextile was never advertised, so the table rejects it.
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(0, 0, 16, 16, 5));

        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_framebuffer_update_negotiated_hextile() {
        let session = ready_session().await;
        session.set_encodings(vec![EncodingType::Hextile]).await;

        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(0, 0, 16, 16, 5));
        bytes.push(0x00); // single tile, all defaults

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap();
        assert!(matches!(msg, ServerMessage::FramebufferUpdate(_)));
    }

    #[tokio::test]
    async fn test_framebuffer_update_too_many_rects() {
        let session = ready_session().await;
        let bytes = update_prelude(10_001);
        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_desktop_size_updates_session_without_pixel_bytes() {
        let session = ready_session().await;
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(0, 0, 1024, 768, -223));
        // No payload bytes follow.

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap();

        assert_eq!(session.dimensions().await, (1024, 768));
        let ServerMessage::FramebufferUpdate(rects) = msg else {
            panic!("expected framebuffer update");
        };
        assert_eq!(
            rects[0].encoding,
            Encoding::DesktopSize(crate::encoding::DesktopResize {
                width: 1024,
                height: 768
            })
        );
        let position = cursor.position() as usize;
        assert_eq!(position, cursor.into_inner().len());
    }

    #[tokio::test]
    async fn test_pseudo_rect_skips_bounds_validation() {
        let session = ready_session().await;
        // 4000x4000 exceeds the 1920x1080 framebuffer but is a resize.
        let mut bytes = update_prelude(1);
        bytes.extend(rect_header_bytes(0, 0, 4000, 4000, -223));

        let mut cursor = std::io::Cursor::new(bytes);
        read_server_message(&session, SERVER_MSG_FRAMEBUFFER_UPDATE, &mut cursor, &[])
            .await
            .unwrap();
        assert_eq!(session.dimensions().await, (4000, 4000));
    }

    #[tokio::test]
    async fn test_set_color_map_entries() {
        let session = ready_session().await;
        let mut bytes = vec![0u8]; // padding
        bytes.extend_from_slice(&5u16.to_be_bytes()); // first color
        bytes.extend_from_slice(&2u16.to_be_bytes()); // count
        for component in [65535u16, 0, 0, 0, 65535, 0] {
            bytes.extend_from_slice(&component.to_be_bytes());
        }

        let mut cursor = std::io::Cursor::new(bytes);
        let msg =
            read_server_message(&session, SERVER_MSG_SET_COLOR_MAP_ENTRIES, &mut cursor, &[])
                .await
                .unwrap();

        assert_eq!(
            msg,
            ServerMessage::SetColorMapEntries {
                first_color: 5,
                colors: vec![Color::RED, Color::GREEN],
            }
        );
        assert_eq!(session.color_map().get(5), Color::RED);
        assert_eq!(session.color_map().get(6), Color::GREEN);
        assert_eq!(session.color_map().get(7), Color::BLACK);
    }

    #[tokio::test]
    async fn test_set_color_map_entries_range_overflow() {
        let session = ready_session().await;
        session.color_map().reset();
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&255u16.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());

        let mut cursor = std::io::Cursor::new(bytes);
        let err =
            read_server_message(&session, SERVER_MSG_SET_COLOR_MAP_ENTRIES, &mut cursor, &[])
                .await
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_server_cut_text() {
        let session = ready_session().await;
        let mut bytes = vec![0u8, 0, 0]; // 3 bytes padding
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(b"hello");

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_SERVER_CUT_TEXT, &mut cursor, &[])
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::ServerCutText("hello".to_string()));
    }

    #[tokio::test]
    async fn test_server_cut_text_sanitizes_control_chars() {
        let session = ready_session().await;
        let payload = b"a\x00b\tc";
        let mut bytes = vec![0u8, 0, 0];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);

        let mut cursor = std::io::Cursor::new(bytes);
        let msg = read_server_message(&session, SERVER_MSG_SERVER_CUT_TEXT, &mut cursor, &[])
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::ServerCutText("a b\tc".to_string()));
    }

    #[tokio::test]
    async fn test_server_cut_text_length_bound() {
        let session = ready_session().await;
        let mut bytes = vec![0u8, 0, 0];
        bytes.extend_from_slice(&(MAX_SERVER_CLIPBOARD_LEN + 1).to_be_bytes());

        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_server_message(&session, SERVER_MSG_SERVER_CUT_TEXT, &mut cursor, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    struct PingDecoder;

    #[async_trait]
    impl ServerMessageDecoder for PingDecoder {
        fn message_type(&self) -> u8 {
            42
        }

        async fn read(
            &self,
            _session: &Session,
            reader: &mut (dyn AsyncRead + Unpin + Send),
        ) -> Result<ServerMessage> {
            let value = reader
                .read_u8()
                .await
                .map_err(|e| RfbError::io("ping_decoder", e))?;
            Ok(ServerMessage::Custom {
                msg_type: 42,
                payload: Bytes::copy_from_slice(&[value]),
            })
        }
    }

    #[tokio::test]
    async fn test_custom_decoder_dispatch() {
        let session = ready_session().await;
        let decoders: Vec<Arc<dyn ServerMessageDecoder>> = vec![Arc::new(PingDecoder)];

        let mut cursor = std::io::Cursor::new(vec![7u8]);
        let msg = read_server_message(&session, 42, &mut cursor, &decoders)
            .await
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Custom {
                msg_type: 42,
                payload: Bytes::copy_from_slice(&[7]),
            }
        );
    }

    struct BellOverride;

    #[async_trait]
    impl ServerMessageDecoder for BellOverride {
        fn message_type(&self) -> u8 {
            SERVER_MSG_BELL
        }

        async fn read(
            &self,
            _session: &Session,
            _reader: &mut (dyn AsyncRead + Unpin + Send),
        ) -> Result<ServerMessage> {
            Ok(ServerMessage::Custom {
                msg_type: SERVER_MSG_BELL,
                payload: Bytes::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_custom_decoder_overrides_builtin() {
        let session = ready_session().await;
        let decoders: Vec<Arc<dyn ServerMessageDecoder>> = vec![Arc::new(BellOverride)];

        let mut cursor = std::io::Cursor::new(Vec::new());
        let msg = read_server_message(&session, SERVER_MSG_BELL, &mut cursor, &decoders)
            .await
            .unwrap();
        assert!(matches!(msg, ServerMessage::Custom { msg_type: 2, .. }));
    }
}
