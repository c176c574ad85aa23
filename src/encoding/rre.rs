//! RRE encoding (type 2): a background color overlaid with solid
//! sub-rectangles.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::color::Color;
use crate::error::{Result, RfbError};
use crate::session::DecodeContext;
use crate::validation::validate_rectangle;

use super::RectHeader;

/// Upper bound on the sub-rectangle count of one RRE rectangle.
const MAX_SUBRECTS: u32 = 1_000_000;

/// A solid-color sub-rectangle, positioned relative to the parent
/// rectangle's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RreSubrect {
    /// Fill color.
    pub color: Color,
    /// Left edge relative to the parent rectangle.
    pub x: u16,
    /// Top edge relative to the parent rectangle.
    pub y: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

/// Decoded RRE rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RreRect {
    /// Color covering the whole rectangle before sub-rectangles apply.
    pub background: Color,
    /// Solid sub-rectangles drawn over the background.
    pub subrects: Vec<RreSubrect>,
}

/// Reads the sub-rectangle count, background pixel, and sub-rectangles.
pub async fn decode<R: AsyncRead + Unpin>(
    ctx: &DecodeContext,
    rect: &RectHeader,
    reader: &mut R,
) -> Result<RreRect> {
    const OP: &str = "rre_decode";

    let num_subrects = reader.read_u32().await.map_err(|e| RfbError::io(OP, e))?;
    if num_subrects > MAX_SUBRECTS {
        return Err(RfbError::encoding(
            OP,
            format!("too many subrectangles: {num_subrects} (max {MAX_SUBRECTS})"),
        ));
    }

    let pixel_reader = ctx.pixel_reader();
    let background = pixel_reader.read_color(reader).await?;

    let mut subrects = Vec::with_capacity(num_subrects.min(4096) as usize);
    for _ in 0..num_subrects {
        let color = pixel_reader.read_color(reader).await?;
        let x = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let y = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let width = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
        let height = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;

        validate_rectangle(x, y, width, height, rect.width, rect.height)
            .map_err(|e| RfbError::encoding(OP, "subrectangle outside parent bounds").caused_by(e))?;

        subrects.push(RreSubrect {
            color,
            x,
            y,
            width,
            height,
        });
    }

    Ok(RreRect {
        background,
        subrects,
    })
}
