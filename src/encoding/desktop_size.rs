//! DesktopSize pseudo-encoding (type -223): dynamic framebuffer resizes.
//!
//! The new dimensions arrive in the rectangle header; the payload is
//! empty. Handling swaps the session's framebuffer dimensions atomically.

use crate::error::{Result, RfbError};
use crate::session::Session;

use super::RectHeader;

/// Largest accepted dimension per side.
const MAX_DESKTOP_DIMENSION: u16 = 32767;

/// Largest accepted framebuffer area, in pixels.
const MAX_DESKTOP_AREA: u64 = 100 * 1024 * 1024;

/// A desktop resize notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopResize {
    /// New framebuffer width.
    pub width: u16,
    /// New framebuffer height.
    pub height: u16,
}

impl DesktopResize {
    /// Applies the resize to the session state.
    pub async fn handle(&self, session: &Session) {
        session.set_dimensions(self.width, self.height).await;
    }
}

/// Validates the dimensions carried by the rectangle header.
///
/// Consumes no payload bytes.
pub fn decode(rect: &RectHeader) -> Result<DesktopResize> {
    const OP: &str = "desktop_size_decode";

    if rect.width == 0 || rect.height == 0 {
        return Err(RfbError::encoding(OP, "desktop dimensions cannot be zero"));
    }
    if rect.width > MAX_DESKTOP_DIMENSION || rect.height > MAX_DESKTOP_DIMENSION {
        return Err(RfbError::encoding(
            OP,
            format!(
                "desktop dimensions too large: {}x{} (max {MAX_DESKTOP_DIMENSION})",
                rect.width, rect.height
            ),
        ));
    }
    let area = u64::from(rect.width) * u64::from(rect.height);
    if area > MAX_DESKTOP_AREA {
        return Err(RfbError::encoding(
            OP,
            format!("desktop area too large: {area} pixels"),
        ));
    }

    Ok(DesktopResize {
        width: rect.width,
        height: rect.height,
    })
}
