//! Hextile encoding (type 5): 16x16 tiles with per-tile subencodings.
//!
//! Tiles run left-to-right, top-to-bottom; edge tiles may be smaller.
//! Background and foreground colors carry over from tile to tile unless a
//! tile's subencoding byte says otherwise, so the running values must not
//! be reset between tiles.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::color::Color;
use crate::error::{Result, RfbError};
use crate::session::DecodeContext;

use super::RectHeader;

/// Subencoding flag: tile is raw pixel data.
pub const HEXTILE_RAW: u8 = 1;
/// Subencoding flag: tile carries a new background pixel.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 2;
/// Subencoding flag: tile carries a new foreground pixel.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 4;
/// Subencoding flag: tile carries sub-rectangles.
pub const HEXTILE_ANY_SUBRECTS: u8 = 8;
/// Subencoding flag: each sub-rectangle carries its own color.
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 16;

/// Tile edge length.
pub const HEXTILE_TILE_SIZE: u16 = 16;

/// Upper bound on tiles per rectangle.
const MAX_TILES: usize = 100_000;

/// A sub-rectangle within a tile, packed coordinates unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HextileSubrect {
    /// Fill color (explicit or the running foreground).
    pub color: Color,
    /// Left edge within the tile (0-15).
    pub x: u8,
    /// Top edge within the tile (0-15).
    pub y: u8,
    /// Width in pixels (1-16).
    pub width: u8,
    /// Height in pixels (1-16).
    pub height: u8,
}

/// One decoded tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HextileTile {
    /// Tile width; 16 except at the right edge.
    pub width: u16,
    /// Tile height; 16 except at the bottom edge.
    pub height: u16,
    /// Effective background for the tile.
    pub background: Color,
    /// Effective foreground for the tile.
    pub foreground: Color,
    /// Dense pixels when the tile is raw; empty otherwise.
    pub raw_pixels: Vec<Color>,
    /// Sub-rectangles drawn over the background.
    pub subrects: Vec<HextileSubrect>,
}

/// Decoded Hextile rectangle: tiles in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HextileRect {
    /// Tiles, left-to-right then top-to-bottom.
    pub tiles: Vec<HextileTile>,
}

/// Decodes all tiles of a Hextile rectangle.
pub async fn decode<R: AsyncRead + Unpin>(
    ctx: &DecodeContext,
    rect: &RectHeader,
    reader: &mut R,
) -> Result<HextileRect> {
    const OP: &str = "hextile_decode";

    let tiles_x = rect.width.div_ceil(HEXTILE_TILE_SIZE);
    let tiles_y = rect.height.div_ceil(HEXTILE_TILE_SIZE);
    let total_tiles = usize::from(tiles_x) * usize::from(tiles_y);
    if total_tiles > MAX_TILES {
        return Err(RfbError::encoding(
            OP,
            format!("rectangle needs {total_tiles} tiles (max {MAX_TILES})"),
        ));
    }

    let pixel_reader = ctx.pixel_reader();
    let mut tiles = Vec::with_capacity(total_tiles);

    // Running colors, inherited by tiles that do not specify their own.
    let mut background = Color::BLACK;
    let mut foreground = Color::BLACK;

    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let tile_width =
                HEXTILE_TILE_SIZE.min(rect.width - tile_x * HEXTILE_TILE_SIZE);
            let tile_height =
                HEXTILE_TILE_SIZE.min(rect.height - tile_y * HEXTILE_TILE_SIZE);

            let subencoding = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;

            if subencoding & HEXTILE_RAW != 0 {
                let count = usize::from(tile_width) * usize::from(tile_height);
                let mut raw_pixels = Vec::with_capacity(count);
                for _ in 0..count {
                    raw_pixels.push(pixel_reader.read_color(reader).await?);
                }
                tiles.push(HextileTile {
                    width: tile_width,
                    height: tile_height,
                    background,
                    foreground,
                    raw_pixels,
                    subrects: Vec::new(),
                });
                continue;
            }

            if subencoding & HEXTILE_BACKGROUND_SPECIFIED != 0 {
                background = pixel_reader.read_color(reader).await?;
            }
            if subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0 {
                foreground = pixel_reader.read_color(reader).await?;
            }

            let mut subrects = Vec::new();
            if subencoding & HEXTILE_ANY_SUBRECTS != 0 {
                let num_subrects = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;
                subrects.reserve(usize::from(num_subrects));

                for _ in 0..num_subrects {
                    let color = if subencoding & HEXTILE_SUBRECTS_COLOURED != 0 {
                        pixel_reader.read_color(reader).await?
                    } else {
                        foreground
                    };

                    let xy = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;
                    let wh = reader.read_u8().await.map_err(|e| RfbError::io(OP, e))?;

                    let subrect = HextileSubrect {
                        color,
                        x: (xy >> 4) & 0x0F,
                        y: xy & 0x0F,
                        width: ((wh >> 4) & 0x0F) + 1,
                        height: (wh & 0x0F) + 1,
                    };

                    if u16::from(subrect.x) >= tile_width || u16::from(subrect.y) >= tile_height {
                        return Err(RfbError::encoding(
                            OP,
                            "subrectangle position outside tile bounds",
                        ));
                    }
                    if u16::from(subrect.x) + u16::from(subrect.width) > tile_width
                        || u16::from(subrect.y) + u16::from(subrect.height) > tile_height
                    {
                        return Err(RfbError::encoding(
                            OP,
                            "subrectangle extends outside tile bounds",
                        ));
                    }

                    subrects.push(subrect);
                }
            }

            tiles.push(HextileTile {
                width: tile_width,
                height: tile_height,
                background,
                foreground,
                raw_pixels: Vec::new(),
                subrects,
            });
        }
    }

    Ok(HextileRect { tiles })
}
