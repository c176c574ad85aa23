//! Shared session state for an established connection.
//!
//! The state is populated once during the handshake (ServerInit) and
//! afterwards mutated only through three sanctioned paths: the client's
//! SetPixelFormat, the server's SetColorMapEntries, and the DesktopSize
//! pseudo-encoding. The reader task is the writer for server-driven
//! changes; caller tasks take read snapshots.

use tokio::sync::RwLock;
use tracing::info;

use crate::color::{Color, ColorMap};
use crate::encoding::EncodingType;
use crate::pixel::{PixelFormat, PixelReader};
use crate::validation::COLOR_MAP_SIZE;

/// The mutable fields of a running session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Framebuffer width in pixels.
    pub fb_width: u16,
    /// Framebuffer height in pixels.
    pub fb_height: u16,
    /// Desktop name announced by the server (sanitized).
    pub desktop_name: String,
    /// Pixel format in effect for framebuffer data.
    pub pixel_format: PixelFormat,
    /// Encodings advertised via SetEncodings, in preference order.
    pub encodings: Vec<EncodingType>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            fb_width: 0,
            fb_height: 0,
            desktop_name: String::new(),
            pixel_format: PixelFormat::rgb888(),
            encodings: Vec::new(),
        }
    }
}

/// Session state shared between the reader task and caller tasks.
///
/// The scalar fields live under a shared-exclusive lock; the color map
/// carries its own finer-grained lock so palette reads during pixel
/// decoding do not contend with dimension lookups.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
    color_map: ColorMap,
}

/// Immutable snapshot of everything rectangle decoding needs.
///
/// Taken per rectangle so decoding is a pure function of the snapshot and
/// the wire bytes, and so no session lock is held across stream reads.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Pixel format in effect when the snapshot was taken.
    pub pixel_format: PixelFormat,
    /// Palette in effect when the snapshot was taken.
    pub palette: [Color; COLOR_MAP_SIZE],
    /// Framebuffer width at snapshot time.
    pub fb_width: u16,
    /// Framebuffer height at snapshot time.
    pub fb_height: u16,
}

impl DecodeContext {
    /// Builds a context directly from its parts.
    pub fn new(
        pixel_format: PixelFormat,
        palette: [Color; COLOR_MAP_SIZE],
        fb_width: u16,
        fb_height: u16,
    ) -> Self {
        DecodeContext {
            pixel_format,
            palette,
            fb_width,
            fb_height,
        }
    }

    /// Returns a pixel reader bound to this snapshot.
    pub fn pixel_reader(&self) -> PixelReader {
        PixelReader::new(self.pixel_format, self.palette)
    }
}

impl Session {
    /// Creates an empty session awaiting ServerInit.
    pub fn new() -> Self {
        Session::default()
    }

    /// Returns the current framebuffer dimensions.
    pub async fn dimensions(&self) -> (u16, u16) {
        let state = self.state.read().await;
        (state.fb_width, state.fb_height)
    }

    /// Returns the desktop name announced by the server.
    pub async fn desktop_name(&self) -> String {
        self.state.read().await.desktop_name.clone()
    }

    /// Returns the pixel format currently in effect.
    pub async fn pixel_format(&self) -> PixelFormat {
        self.state.read().await.pixel_format
    }

    /// Returns the advertised encodings in preference order.
    pub async fn encodings(&self) -> Vec<EncodingType> {
        self.state.read().await.encodings.clone()
    }

    /// Returns a copy of the full session state.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Returns the session color map.
    pub fn color_map(&self) -> &ColorMap {
        &self.color_map
    }

    /// Takes the decode snapshot used for one rectangle.
    pub async fn decode_context(&self) -> DecodeContext {
        let state = self.state.read().await;
        DecodeContext {
            pixel_format: state.pixel_format,
            palette: self.color_map.snapshot(),
            fb_width: state.fb_width,
            fb_height: state.fb_height,
        }
    }

    /// Installs the fields learned from ServerInit.
    pub(crate) async fn install_server_init(
        &self,
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
        desktop_name: String,
    ) {
        let mut state = self.state.write().await;
        state.fb_width = width;
        state.fb_height = height;
        state.pixel_format = pixel_format;
        state.desktop_name = desktop_name;
    }

    /// Applies a DesktopSize resize atomically.
    pub(crate) async fn set_dimensions(&self, width: u16, height: u16) {
        let mut state = self.state.write().await;
        let (old_width, old_height) = (state.fb_width, state.fb_height);
        state.fb_width = width;
        state.fb_height = height;
        info!(
            old_width,
            old_height,
            new_width = width,
            new_height = height,
            "desktop size changed"
        );
    }

    /// Records a client-initiated pixel format change and resets the
    /// color map to all-zero entries.
    pub(crate) async fn set_pixel_format(&self, pixel_format: PixelFormat) {
        let mut state = self.state.write().await;
        state.pixel_format = pixel_format;
        self.color_map.reset();
    }

    /// Records the encodings advertised to the server.
    pub(crate) async fn set_encodings(&self, encodings: Vec<EncodingType>) {
        self.state.write().await.encodings = encodings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let session = Session::new();
        assert_eq!(session.dimensions().await, (0, 0));
        assert_eq!(session.desktop_name().await, "");
        assert!(session.encodings().await.is_empty());
        assert_eq!(session.pixel_format().await, PixelFormat::rgb888());
    }

    #[tokio::test]
    async fn test_install_server_init() {
        let session = Session::new();
        session
            .install_server_init(800, 600, PixelFormat::rgb565(), "desk".to_string())
            .await;

        assert_eq!(session.dimensions().await, (800, 600));
        assert_eq!(session.desktop_name().await, "desk");
        assert_eq!(session.pixel_format().await, PixelFormat::rgb565());
    }

    #[tokio::test]
    async fn test_set_dimensions() {
        let session = Session::new();
        session
            .install_server_init(800, 600, PixelFormat::rgb888(), "desk".to_string())
            .await;
        session.set_dimensions(1024, 768).await;
        assert_eq!(session.dimensions().await, (1024, 768));
    }

    #[tokio::test]
    async fn test_set_pixel_format_resets_color_map() {
        let session = Session::new();
        assert_eq!(session.color_map().get(255), Color::WHITE);

        session.set_pixel_format(PixelFormat::indexed8()).await;

        assert_eq!(session.pixel_format().await, PixelFormat::indexed8());
        for index in [0u8, 1, 128, 255] {
            assert_eq!(session.color_map().get(index), Color::BLACK);
        }
    }

    #[tokio::test]
    async fn test_set_encodings() {
        let session = Session::new();
        session
            .set_encodings(vec![EncodingType::Hextile, EncodingType::Raw])
            .await;
        assert_eq!(
            session.encodings().await,
            vec![EncodingType::Hextile, EncodingType::Raw]
        );
    }

    #[tokio::test]
    async fn test_decode_context_snapshot() {
        let session = Session::new();
        session
            .install_server_init(640, 480, PixelFormat::rgb888(), "x".to_string())
            .await;
        session.color_map().set(3, Color::RED);

        let ctx = session.decode_context().await;
        assert_eq!(ctx.fb_width, 640);
        assert_eq!(ctx.fb_height, 480);
        assert_eq!(ctx.pixel_format, PixelFormat::rgb888());
        assert_eq!(ctx.palette[3], Color::RED);

        // Later palette writes do not affect the snapshot.
        session.color_map().set(3, Color::GREEN);
        assert_eq!(ctx.palette[3], Color::RED);
    }

    #[tokio::test]
    async fn test_state_copy() {
        let session = Session::new();
        session
            .install_server_init(320, 200, PixelFormat::rgb555(), "retro".to_string())
            .await;
        let state = session.state().await;
        assert_eq!(state.fb_width, 320);
        assert_eq!(state.fb_height, 200);
        assert_eq!(state.desktop_name, "retro");
    }
}
