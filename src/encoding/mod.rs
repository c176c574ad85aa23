//! Rectangle encodings for framebuffer updates.
//!
//! Every rectangle in a FramebufferUpdate names an encoding by a signed
//! 32-bit type code. Real encodings (non-negative codes) carry pixel data
//! for a validated region of the framebuffer; pseudo-encodings (negative
//! codes) carry session-level changes such as cursor shapes and desktop
//! resizes, and skip framebuffer bounds validation.
//!
//! Decoders are dispatched through a table seeded from the encodings the
//! client advertised, plus the always-mandatory Raw, Cursor and
//! DesktopSize. Each decoder consumes the rectangle's wire bytes and
//! produces a typed [`Encoding`] value; pseudo-encodings additionally get
//! a `handle` pass that applies their session effect.

pub mod copyrect;
pub mod cursor;
pub mod desktop_size;
pub mod hextile;
pub mod raw;
pub mod rre;

pub use copyrect::CopyRectSource;
pub use cursor::CursorShape;
pub use desktop_size::DesktopResize;
pub use hextile::{HextileRect, HextileSubrect, HextileTile};
pub use raw::RawPixels;
pub use rre::{RreRect, RreSubrect};

use std::collections::HashSet;

use tokio::io::AsyncRead;

use crate::error::{Result, RfbError};
use crate::session::DecodeContext;

/// Type code for Raw encoding.
pub const ENCODING_RAW: i32 = 0;
/// Type code for CopyRect encoding.
pub const ENCODING_COPYRECT: i32 = 1;
/// Type code for RRE encoding.
pub const ENCODING_RRE: i32 = 2;
/// Type code for Hextile encoding.
pub const ENCODING_HEXTILE: i32 = 5;
/// Type code for the Cursor pseudo-encoding.
pub const ENCODING_CURSOR: i32 = -239;
/// Type code for the DesktopSize pseudo-encoding.
pub const ENCODING_DESKTOP_SIZE: i32 = -223;

/// The encodings this engine can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingType {
    /// Raw pixel data (0).
    Raw,
    /// Copy from another framebuffer region (1).
    CopyRect,
    /// Rise-and-run-length encoding (2).
    Rre,
    /// 16x16 tiled encoding (5).
    Hextile,
    /// Cursor shape pseudo-encoding (-239).
    Cursor,
    /// Desktop resize pseudo-encoding (-223).
    DesktopSize,
}

impl EncodingType {
    /// The wire type code.
    pub const fn code(self) -> i32 {
        match self {
            EncodingType::Raw => ENCODING_RAW,
            EncodingType::CopyRect => ENCODING_COPYRECT,
            EncodingType::Rre => ENCODING_RRE,
            EncodingType::Hextile => ENCODING_HEXTILE,
            EncodingType::Cursor => ENCODING_CURSOR,
            EncodingType::DesktopSize => ENCODING_DESKTOP_SIZE,
        }
    }

    /// Maps a wire type code to a known encoding.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            ENCODING_RAW => Some(EncodingType::Raw),
            ENCODING_COPYRECT => Some(EncodingType::CopyRect),
            ENCODING_RRE => Some(EncodingType::Rre),
            ENCODING_HEXTILE => Some(EncodingType::Hextile),
            ENCODING_CURSOR => Some(EncodingType::Cursor),
            ENCODING_DESKTOP_SIZE => Some(EncodingType::DesktopSize),
            _ => None,
        }
    }

    /// Whether this is a pseudo-encoding (negative type code).
    pub const fn is_pseudo(self) -> bool {
        self.code() < 0
    }
}

/// Geometry and type code of one rectangle in a framebuffer update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectHeader {
    /// Left edge, or hotspot X for cursor pseudo-rectangles.
    pub x: u16,
    /// Top edge, or hotspot Y for cursor pseudo-rectangles.
    pub y: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Signed encoding type code.
    pub encoding_type: i32,
}

/// A decoded rectangle from a framebuffer update.
#[derive(Debug, Clone, PartialEq)]
pub struct Rectangle {
    /// Left edge, or hotspot X for cursor pseudo-rectangles.
    pub x: u16,
    /// Top edge, or hotspot Y for cursor pseudo-rectangles.
    pub y: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// The decoded per-rectangle payload.
    pub encoding: Encoding,
}

/// Decoded payload of one rectangle, tagged by encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Dense pixel data.
    Raw(RawPixels),
    /// Source coordinates for an intra-framebuffer copy.
    CopyRect(CopyRectSource),
    /// Background plus solid sub-rectangles.
    Rre(RreRect),
    /// Tiled encoding.
    Hextile(HextileRect),
    /// Cursor shape update.
    Cursor(CursorShape),
    /// Desktop resize notification.
    DesktopSize(DesktopResize),
}

impl Encoding {
    /// The wire type code of this payload.
    pub fn type_code(&self) -> i32 {
        match self {
            Encoding::Raw(_) => ENCODING_RAW,
            Encoding::CopyRect(_) => ENCODING_COPYRECT,
            Encoding::Rre(_) => ENCODING_RRE,
            Encoding::Hextile(_) => ENCODING_HEXTILE,
            Encoding::Cursor(_) => ENCODING_CURSOR,
            Encoding::DesktopSize(_) => ENCODING_DESKTOP_SIZE,
        }
    }

    /// Whether this payload came from a pseudo-encoding.
    pub fn is_pseudo(&self) -> bool {
        self.type_code() < 0
    }
}

/// The set of type codes the parser will dispatch for one session.
///
/// Seeded from the advertised encodings plus the mandatory Raw, Cursor
/// and DesktopSize; everything else is reported as unsupported.
#[derive(Debug, Clone)]
pub struct EncoderTable {
    allowed: HashSet<i32>,
}

impl EncoderTable {
    /// Builds the table for a session's advertised encodings.
    pub fn for_session(advertised: &[EncodingType]) -> Self {
        let mut allowed: HashSet<i32> = advertised.iter().map(|e| e.code()).collect();
        allowed.insert(ENCODING_RAW);
        allowed.insert(ENCODING_CURSOR);
        allowed.insert(ENCODING_DESKTOP_SIZE);
        EncoderTable { allowed }
    }

    /// Whether `code` has a registered decoder for this session.
    pub fn contains(&self, code: i32) -> bool {
        self.allowed.contains(&code) && EncodingType::from_code(code).is_some()
    }
}

/// Decodes one rectangle's payload according to its type code.
///
/// The caller is responsible for bounds validation and for checking the
/// session's [`EncoderTable`]; this function fails with `Unsupported`
/// only for codes no decoder exists for at all.
pub async fn decode_rectangle<R: AsyncRead + Unpin>(
    ctx: &DecodeContext,
    header: &RectHeader,
    reader: &mut R,
) -> Result<Encoding> {
    match header.encoding_type {
        ENCODING_RAW => Ok(Encoding::Raw(raw::decode(ctx, header, reader).await?)),
        ENCODING_COPYRECT => Ok(Encoding::CopyRect(copyrect::decode(header, reader).await?)),
        ENCODING_RRE => Ok(Encoding::Rre(rre::decode(ctx, header, reader).await?)),
        ENCODING_HEXTILE => Ok(Encoding::Hextile(hextile::decode(ctx, header, reader).await?)),
        ENCODING_CURSOR => Ok(Encoding::Cursor(cursor::decode(ctx, header, reader).await?)),
        ENCODING_DESKTOP_SIZE => Ok(Encoding::DesktopSize(desktop_size::decode(header)?)),
        code => Err(RfbError::unsupported(
            "decode_rectangle",
            format!("unsupported encoding type: {code}"),
        )),
    }
}
