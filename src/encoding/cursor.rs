//! Cursor pseudo-encoding (type -239): local cursor shape updates.
//!
//! The rectangle's width and height give the cursor size, its x and y the
//! hotspot. A 0x0 cursor hides the pointer. The payload is raw pixel
//! bytes in the current pixel format followed by a one-bit-per-pixel
//! transparency mask, MSB-first within each byte and rows padded to whole
//! bytes.

use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Result, RfbError};
use crate::pixel::{mask_data_len, pixel_data_len};
use crate::session::DecodeContext;

use super::RectHeader;

/// Largest accepted cursor edge length.
const MAX_CURSOR_DIMENSION: u16 = 256;

/// A decoded cursor shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorShape {
    /// Cursor width in pixels; 0 together with height 0 hides the cursor.
    pub width: u16,
    /// Cursor height in pixels.
    pub height: u16,
    /// Hotspot X offset from the cursor's left edge.
    pub hotspot_x: u16,
    /// Hotspot Y offset from the cursor's top edge.
    pub hotspot_y: u16,
    /// Raw cursor pixels in the pixel format current at decode time.
    pub pixel_data: Vec<u8>,
    /// Transparency bitmask, one bit per pixel, MSB first.
    pub mask_data: Vec<u8>,
}

impl CursorShape {
    /// Whether this update hides the cursor.
    pub fn is_hidden(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Returns whether the pixel at `(x, y)` is opaque per the mask.
    pub fn mask_bit(&self, x: u16, y: u16) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let bytes_per_row = usize::from(self.width).div_ceil(8);
        let byte = self.mask_data[usize::from(y) * bytes_per_row + usize::from(x / 8)];
        byte & (0x80 >> (x % 8)) != 0
    }

    /// Applies the cursor update to client-side cursor state.
    ///
    /// The engine only records the shape; rendering is the consumer's
    /// concern, so this is a logging hook.
    pub fn handle(&self) {
        if self.is_hidden() {
            debug!("cursor hidden");
        } else {
            debug!(
                width = self.width,
                height = self.height,
                hotspot_x = self.hotspot_x,
                hotspot_y = self.hotspot_y,
                "cursor shape updated"
            );
        }
    }
}

/// Reads the cursor pixel and mask data for the rectangle.
pub async fn decode<R: AsyncRead + Unpin>(
    ctx: &DecodeContext,
    rect: &RectHeader,
    reader: &mut R,
) -> Result<CursorShape> {
    const OP: &str = "cursor_decode";

    let mut cursor = CursorShape {
        width: rect.width,
        height: rect.height,
        hotspot_x: rect.x,
        hotspot_y: rect.y,
        pixel_data: Vec::new(),
        mask_data: Vec::new(),
    };

    if cursor.is_hidden() {
        return Ok(cursor);
    }

    if rect.width > MAX_CURSOR_DIMENSION || rect.height > MAX_CURSOR_DIMENSION {
        return Err(RfbError::encoding(
            OP,
            format!(
                "cursor dimensions too large: {}x{} (max {MAX_CURSOR_DIMENSION})",
                rect.width, rect.height
            ),
        ));
    }

    let pixel_reader = ctx.pixel_reader();
    let pixel_len = pixel_data_len(rect.width, rect.height, &ctx.pixel_format);
    let mask_len = mask_data_len(rect.width, rect.height);

    cursor.pixel_data = pixel_reader.read_raw(reader, pixel_len).await?;
    cursor.mask_data = pixel_reader.read_raw(reader, mask_len).await?;

    Ok(cursor)
}
