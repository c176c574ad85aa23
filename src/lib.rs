//! # rfbclient - an asynchronous RFB (VNC) client protocol engine
//!
//! This crate implements the client side of the Remote Framebuffer
//! protocol (RFC 6143, RFB 3.8): the handshake state machine, parsing of
//! server-to-client messages with pluggable per-rectangle encodings
//! (Raw, CopyRect, RRE, Hextile, plus the Cursor and DesktopSize
//! pseudo-encodings), serialization of client input messages, the pixel
//! format model, and DES challenge-response authentication.
//!
//! It is a protocol engine, not a viewer: the caller supplies an
//! already-connected byte stream and receives decoded messages through a
//! bounded channel. Rendering, clipboard integration and transport
//! establishment stay outside.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rfbclient::{ClientConfig, Connection, EncodingType, PasswordAuth, ServerMessage};
//! use tokio::net::TcpStream;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stream = TcpStream::connect("127.0.0.1:5900").await?;
//!     let (tx, mut rx) = mpsc::channel(64);
//!
//!     let config = ClientConfig::new()
//!         .with_auth(PasswordAuth::new("secret"))
//!         .with_server_message_channel(tx);
//!     let conn = Connection::establish(stream, config).await?;
//!
//!     conn.set_encodings(&[EncodingType::Hextile, EncodingType::CopyRect]).await?;
//!     let (width, height) = conn.session().dimensions().await;
//!     conn.framebuffer_update_request(false, 0, 0, width, height).await?;
//!
//!     while let Some(message) = rx.recv().await {
//!         if let ServerMessage::FramebufferUpdate(rects) = message {
//!             // Paint the rectangles.
//!             let _ = rects;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! After the handshake the stream is split: a background reader task
//! owns the receive half and delivers each parsed [`ServerMessage`] in
//! wire order, while callers send input events through [`Connection`]
//! methods serialized by a write lock. Session state (dimensions, pixel
//! format, color map, desktop name) sits behind a shared-exclusive lock
//! and is mutated only by the handshake, SetPixelFormat,
//! SetColorMapEntries, and the DesktopSize pseudo-encoding.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod color;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod message;
pub mod metrics;
pub mod pixel;
pub mod session;
pub mod validation;

// Re-export the primary entry points.
pub use auth::{AuthNone, AuthRegistry, ClientAuth, PasswordAuth};
pub use color::{Color, ColorMap};
pub use config::ClientConfig;
pub use connection::{Connection, RfbStream};
pub use encoding::{Encoding, EncodingType, Rectangle};
pub use error::{ErrorKind, Result, RfbError};
pub use message::{ButtonMask, ServerMessage, ServerMessageDecoder};
pub use metrics::{MetricsCollector, NoOpMetrics};
pub use pixel::{PixelFormat, PixelReader};
pub use session::{DecodeContext, Session, SessionState};

/// Version of the rfbclient library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
