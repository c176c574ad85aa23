//! Raw encoding (type 0): uncompressed pixels in row-major order.

use tokio::io::AsyncRead;

use crate::color::Color;
use crate::error::Result;
use crate::session::DecodeContext;

use super::RectHeader;

/// Dense pixel data for one rectangle, left-to-right, top-to-bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    /// One decoded color per pixel, `width * height` entries.
    pub colors: Vec<Color>,
}

/// Reads `width * height` pixels in the session's pixel format.
pub async fn decode<R: AsyncRead + Unpin>(
    ctx: &DecodeContext,
    rect: &RectHeader,
    reader: &mut R,
) -> Result<RawPixels> {
    let pixel_reader = ctx.pixel_reader();
    let count = usize::from(rect.width) * usize::from(rect.height);
    let mut colors = Vec::with_capacity(count);

    for _ in 0..count {
        colors.push(pixel_reader.read_color(reader).await?);
    }

    Ok(RawPixels { colors })
}
