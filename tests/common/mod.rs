//! Test utilities for rfbclient integration tests.
//!
//! Provides duplex stream pairs and a scripted mock VNC server that
//! speaks the RFB 3.8 handshake and then replays prepared
//! server-to-client frames.

#![allow(dead_code)]

use rfbclient::auth::encrypt_challenge;
use rfbclient::PixelFormat;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Creates a pair of connected in-memory streams.
pub fn stream_pair() -> (DuplexStream, DuplexStream) {
    duplex(64 * 1024)
}

/// Installs a compact tracing subscriber for debugging test runs.
/// Subsequent calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// What the mock server observed from the client.
#[derive(Debug, Default)]
pub struct MockOutcome {
    /// The shared-access flag from ClientInit.
    pub client_init_shared: u8,
    /// The security type the client selected.
    pub selected_security_type: u8,
    /// Client bytes captured after the handshake (see
    /// [`MockVncServer::wait_client_bytes`]).
    pub client_bytes: Vec<u8>,
}

/// A scripted mock VNC server for driving the engine over a duplex
/// stream.
pub struct MockVncServer {
    /// Version banner sent first; 12 bytes.
    pub version_banner: Vec<u8>,
    /// Security types offered, in order. Empty means refuse the
    /// connection with `failure_reason`.
    pub auth_methods: Vec<u8>,
    /// Reason sent when refusing (zero security types).
    pub failure_reason: String,
    /// Password checked when VNC authentication is negotiated.
    pub password: String,
    /// Challenge sent for VNC authentication.
    pub challenge: [u8; 16],
    /// Whether to accept an otherwise-valid authentication.
    pub accept_auth: bool,
    /// Framebuffer width announced in ServerInit.
    pub frame_width: u16,
    /// Framebuffer height announced in ServerInit.
    pub frame_height: u16,
    /// Desktop name announced in ServerInit.
    pub desktop_name: String,
    /// Pixel format announced in ServerInit.
    pub pixel_format: PixelFormat,
    /// Number of client bytes to consume after the handshake before
    /// replaying `messages` (e.g. the 8-byte SetEncodings frame).
    pub wait_client_bytes: usize,
    /// Server-to-client frames replayed verbatim after the handshake.
    pub messages: Vec<Vec<u8>>,
    /// Keep the stream open after replaying messages until the peer
    /// closes it.
    pub hold_open: bool,
}

impl Default for MockVncServer {
    fn default() -> Self {
        MockVncServer {
            version_banner: b"RFB 003.008\n".to_vec(),
            auth_methods: vec![1],
            failure_reason: "connection refused".to_string(),
            password: String::new(),
            challenge: *b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f",
            accept_auth: true,
            frame_width: 800,
            frame_height: 600,
            desktop_name: "Mock VNC Server".to_string(),
            pixel_format: PixelFormat::rgb888(),
            wait_client_bytes: 0,
            messages: Vec::new(),
            hold_open: false,
        }
    }
}

impl MockVncServer {
    /// Creates a mock with None authentication and an 800x600 desktop.
    pub fn new() -> Self {
        MockVncServer::default()
    }

    /// Sets the offered security types.
    pub fn auth_methods(mut self, methods: &[u8]) -> Self {
        self.auth_methods = methods.to_vec();
        self
    }

    /// Sets the password verified for VNC authentication.
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Sets the framebuffer dimensions.
    pub fn framebuffer(mut self, width: u16, height: u16) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// Sets the desktop name.
    pub fn desktop_name(mut self, name: &str) -> Self {
        self.desktop_name = name.to_string();
        self
    }

    /// Sets the announced pixel format.
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Queues one server-to-client frame to replay after the handshake.
    pub fn message(mut self, frame: Vec<u8>) -> Self {
        self.messages.push(frame);
        self
    }

    /// Consumes `count` client bytes before replaying queued frames.
    pub fn wait_client_bytes(mut self, count: usize) -> Self {
        self.wait_client_bytes = count;
        self
    }

    /// Keeps the stream open after replaying queued frames.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Runs the scripted server on one end of a duplex stream.
    pub async fn run(self, mut stream: DuplexStream) -> anyhow::Result<MockOutcome> {
        let mut outcome = MockOutcome::default();

        // Protocol version exchange.
        stream.write_all(&self.version_banner).await?;
        let mut client_version = [0u8; 12];
        stream.read_exact(&mut client_version).await?;

        // Security handshake.
        stream.write_all(&[self.auth_methods.len() as u8]).await?;
        if self.auth_methods.is_empty() {
            let reason = self.failure_reason.as_bytes();
            stream.write_all(&(reason.len() as u32).to_be_bytes()).await?;
            stream.write_all(reason).await?;
            return Ok(outcome);
        }
        stream.write_all(&self.auth_methods).await?;

        let mut selected = [0u8; 1];
        stream.read_exact(&mut selected).await?;
        outcome.selected_security_type = selected[0];

        let mut auth_ok = self.accept_auth;
        if selected[0] == 2 {
            stream.write_all(&self.challenge).await?;
            let mut response = [0u8; 16];
            stream.read_exact(&mut response).await?;
            let expected = encrypt_challenge(self.password.as_bytes(), &self.challenge)
                .expect("challenge encryption");
            auth_ok = auth_ok && response == expected;
        }

        // Security result.
        if auth_ok {
            stream.write_all(&0u32.to_be_bytes()).await?;
        } else {
            stream.write_all(&1u32.to_be_bytes()).await?;
            let reason = b"authentication failed";
            stream.write_all(&(reason.len() as u32).to_be_bytes()).await?;
            stream.write_all(reason).await?;
            return Ok(outcome);
        }

        // ClientInit.
        let mut shared = [0u8; 1];
        stream.read_exact(&mut shared).await?;
        outcome.client_init_shared = shared[0];

        // ServerInit.
        stream.write_all(&self.frame_width.to_be_bytes()).await?;
        stream.write_all(&self.frame_height.to_be_bytes()).await?;
        stream.write_all(&self.pixel_format.to_wire()).await?;
        let name = self.desktop_name.as_bytes();
        stream.write_all(&(name.len() as u32).to_be_bytes()).await?;
        stream.write_all(name).await?;
        stream.flush().await?;

        if self.wait_client_bytes > 0 {
            let mut buf = vec![0u8; self.wait_client_bytes];
            stream.read_exact(&mut buf).await?;
            outcome.client_bytes = buf;
        }

        for frame in &self.messages {
            stream.write_all(frame).await?;
        }
        stream.flush().await?;

        if self.hold_open {
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
            outcome.client_bytes.extend_from_slice(&sink);
        }

        Ok(outcome)
    }
}

/// Builds a FramebufferUpdate frame from raw rectangle bodies.
///
/// Each entry is `(x, y, width, height, encoding_type, payload)`.
pub fn framebuffer_update_frame(rects: &[(u16, u16, u16, u16, i32, Vec<u8>)]) -> Vec<u8> {
    let mut frame = vec![0u8, 0]; // message type, padding
    frame.extend_from_slice(&(rects.len() as u16).to_be_bytes());
    for (x, y, width, height, encoding, payload) in rects {
        frame.extend_from_slice(&x.to_be_bytes());
        frame.extend_from_slice(&y.to_be_bytes());
        frame.extend_from_slice(&width.to_be_bytes());
        frame.extend_from_slice(&height.to_be_bytes());
        frame.extend_from_slice(&encoding.to_be_bytes());
        frame.extend_from_slice(payload);
    }
    frame
}

/// Builds a ServerCutText frame.
pub fn server_cut_text_frame(text: &str) -> Vec<u8> {
    let mut frame = vec![3u8, 0, 0, 0];
    frame.extend_from_slice(&(text.len() as u32).to_be_bytes());
    frame.extend_from_slice(text.as_bytes());
    frame
}

/// Builds a SetColorMapEntries frame.
pub fn set_color_map_frame(first: u16, colors: &[(u16, u16, u16)]) -> Vec<u8> {
    let mut frame = vec![1u8, 0];
    frame.extend_from_slice(&first.to_be_bytes());
    frame.extend_from_slice(&(colors.len() as u16).to_be_bytes());
    for (r, g, b) in colors {
        frame.extend_from_slice(&r.to_be_bytes());
        frame.extend_from_slice(&g.to_be_bytes());
        frame.extend_from_slice(&b.to_be_bytes());
    }
    frame
}

/// Encodes one RGB888 little-endian pixel as wire bytes.
pub fn rgb888_pixel(r: u8, g: u8, b: u8) -> [u8; 4] {
    [b, g, r, 0]
}
