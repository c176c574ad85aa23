//! CopyRect encoding (type 1): copy pixels from elsewhere in the
//! framebuffer.
//!
//! The wire payload is just the source coordinates; the engine produces a
//! descriptor and leaves the actual copy to the consumer. Consumers must
//! handle overlapping source and destination regions by choosing the copy
//! direction from their relative positions.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, RfbError};

use super::RectHeader;

/// Sanity cap on source coordinates. Not mandated by RFC 6143; servers
/// with framebuffers wider than 32767 pixels would be rejected here.
const MAX_SRC_COORD: u16 = 32767;

/// Source region for an intra-framebuffer copy.
///
/// The copy has the same width and height as the destination rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRectSource {
    /// Left edge of the source region.
    pub src_x: u16,
    /// Top edge of the source region.
    pub src_y: u16,
}

/// Reads the 4-byte source coordinates.
pub async fn decode<R: AsyncRead + Unpin>(
    _rect: &RectHeader,
    reader: &mut R,
) -> Result<CopyRectSource> {
    const OP: &str = "copyrect_decode";

    let src_x = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;
    let src_y = reader.read_u16().await.map_err(|e| RfbError::io(OP, e))?;

    if src_x > MAX_SRC_COORD || src_y > MAX_SRC_COORD {
        return Err(RfbError::encoding(
            OP,
            format!("source coordinates out of range: ({src_x},{src_y})"),
        ));
    }

    Ok(CopyRectSource { src_x, src_y })
}
