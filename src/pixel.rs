//! Pixel format model and the format-aware pixel decoder.
//!
//! The pixel format travels as a fixed 16-byte structure (RFC 6143 §7.4)
//! and parameterizes every pixel read for the rest of the session: byte
//! count, byte order, and either true-color extraction via shifts and
//! masks or a color map lookup.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::color::Color;
use crate::error::{Result, RfbError};
use crate::validation::COLOR_MAP_SIZE;

/// Wire size of the pixel format structure, including 3 bytes of padding.
pub const PIXEL_FORMAT_WIRE_LEN: usize = 16;

/// Describes how pixel color data is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel: 8, 16, or 32.
    pub bits_per_pixel: u8,
    /// Number of useful bits within each pixel value (1..=bits_per_pixel).
    pub depth: u8,
    /// Whether multi-byte pixels are big-endian on the wire.
    pub big_endian: bool,
    /// Whether pixels carry direct RGB values (true) or color map indices.
    pub true_color: bool,
    /// Maximum red component value.
    pub red_max: u16,
    /// Maximum green component value.
    pub green_max: u16,
    /// Maximum blue component value.
    pub blue_max: u16,
    /// Right-shift that positions red at the least significant bits.
    pub red_shift: u8,
    /// Right-shift that positions green at the least significant bits.
    pub green_shift: u8,
    /// Right-shift that positions blue at the least significant bits.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32-bit little-endian true color with 8 bits per component
    /// (red shift 16, green shift 8, blue shift 0).
    pub const fn rgb888() -> Self {
        PixelFormat {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// 16-bit little-endian RGB565 true color.
    pub const fn rgb565() -> Self {
        PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: false,
            true_color: true,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 16-bit little-endian RGB555 true color.
    pub const fn rgb555() -> Self {
        PixelFormat {
            bits_per_pixel: 16,
            depth: 15,
            big_endian: false,
            true_color: true,
            red_max: 31,
            green_max: 31,
            blue_max: 31,
            red_shift: 10,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 8-bit indexed color; pixel values are color map indices.
    pub const fn indexed8() -> Self {
        PixelFormat {
            bits_per_pixel: 8,
            depth: 8,
            big_endian: false,
            true_color: false,
            red_max: 0,
            green_max: 0,
            blue_max: 0,
            red_shift: 0,
            green_shift: 0,
            blue_shift: 0,
        }
    }

    /// Number of bytes each pixel occupies on the wire.
    pub const fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    /// Appends the 16-byte wire form to `buf`.
    ///
    /// The max/shift fields are always emitted; when `true_color` is
    /// false the peer ignores them.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(u8::from(self.big_endian));
        buf.put_u8(u8::from(self.true_color));
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Returns the 16-byte wire form as an array.
    pub fn to_wire(&self) -> [u8; PIXEL_FORMAT_WIRE_LEN] {
        let mut buf = BytesMut::with_capacity(PIXEL_FORMAT_WIRE_LEN);
        self.write_to(&mut buf);
        let mut out = [0u8; PIXEL_FORMAT_WIRE_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Parses the 16-byte wire form.
    pub fn from_wire(buf: &[u8]) -> Result<Self> {
        const OP: &str = "pixel_format_from_wire";

        if buf.len() < PIXEL_FORMAT_WIRE_LEN {
            return Err(RfbError::protocol(
                OP,
                format!("pixel format requires {PIXEL_FORMAT_WIRE_LEN} bytes, got {}", buf.len()),
            ));
        }
        Ok(PixelFormat {
            bits_per_pixel: buf[0],
            depth: buf[1],
            big_endian: buf[2] != 0,
            true_color: buf[3] != 0,
            red_max: u16::from_be_bytes([buf[4], buf[5]]),
            green_max: u16::from_be_bytes([buf[6], buf[7]]),
            blue_max: u16::from_be_bytes([buf[8], buf[9]]),
            red_shift: buf[10],
            green_shift: buf[11],
            blue_shift: buf[12],
            // bytes 13-15 are padding
        })
    }

    /// Reads and parses the 16-byte wire form from an async stream.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; PIXEL_FORMAT_WIRE_LEN];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| RfbError::io("pixel_format_read", e))?;
        PixelFormat::from_wire(&buf)
    }

    /// Validates the format against the RFC 6143 constraints.
    ///
    /// `bits_per_pixel` must be 8, 16 or 32; `depth` must be in
    /// `1..=bits_per_pixel`; for true color each component maximum must be
    /// non-zero, each shift strictly below `bits_per_pixel`, and the total
    /// component bit count must not exceed `depth`.
    pub fn validate(&self) -> Result<()> {
        const OP: &str = "pixel_format_validate";

        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            return Err(RfbError::validation(
                OP,
                format!("bits per pixel must be 8, 16 or 32, got {}", self.bits_per_pixel),
            ));
        }
        if self.depth == 0 || self.depth > self.bits_per_pixel {
            return Err(RfbError::validation(
                OP,
                format!(
                    "depth must be 1-{} for {}-bit pixels, got {}",
                    self.bits_per_pixel, self.bits_per_pixel, self.depth
                ),
            ));
        }
        if self.true_color {
            if self.red_max == 0 || self.green_max == 0 || self.blue_max == 0 {
                return Err(RfbError::validation(
                    OP,
                    "component maximums cannot be zero in true color mode",
                ));
            }
            let bpp = self.bits_per_pixel;
            if self.red_shift >= bpp || self.green_shift >= bpp || self.blue_shift >= bpp {
                return Err(RfbError::validation(
                    OP,
                    format!("component shifts must be below {bpp} bits"),
                ));
            }
            let component_bits =
                self.red_max.count_ones() + self.green_max.count_ones() + self.blue_max.count_ones();
            if component_bits > u32::from(self.depth) {
                return Err(RfbError::validation(
                    OP,
                    format!(
                        "component bits ({component_bits}) exceed depth ({})",
                        self.depth
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::rgb888()
    }
}

/// Decodes wire pixels into [`Color`] values.
///
/// The reader captures the pixel format and a palette snapshot at
/// construction, making every decode a pure function of (format, palette,
/// raw bytes).
#[derive(Debug, Clone)]
pub struct PixelReader {
    format: PixelFormat,
    palette: [Color; COLOR_MAP_SIZE],
}

impl PixelReader {
    /// Creates a pixel reader from a format and a palette snapshot.
    pub fn new(format: PixelFormat, palette: [Color; COLOR_MAP_SIZE]) -> Self {
        PixelReader { format, palette }
    }

    /// Number of bytes each pixel occupies on the wire.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Reads one pixel from the stream and decodes it.
    pub async fn read_color<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<Color> {
        let mut buf = [0u8; 4];
        let n = self.bytes_per_pixel();
        reader
            .read_exact(&mut buf[..n])
            .await
            .map_err(|e| RfbError::io("read_pixel", e))?;
        self.decode_raw(&buf[..n])
    }

    /// Decodes one pixel from its wire bytes.
    pub fn decode_raw(&self, bytes: &[u8]) -> Result<Color> {
        let raw = match (bytes.len(), self.format.big_endian) {
            (1, _) => u32::from(bytes[0]),
            (2, true) => u32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
            (2, false) => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            (4, true) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (4, false) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (n, _) => {
                return Err(RfbError::encoding(
                    "decode_pixel",
                    format!("unsupported pixel width: {n} bytes"),
                ))
            }
        };
        self.decode_value(raw)
    }

    /// Decodes a raw pixel value already assembled in host order.
    pub fn decode_value(&self, raw: u32) -> Result<Color> {
        if self.format.true_color {
            Ok(Color {
                r: ((raw >> self.format.red_shift) & u32::from(self.format.red_max)) as u16,
                g: ((raw >> self.format.green_shift) & u32::from(self.format.green_max)) as u16,
                b: ((raw >> self.format.blue_shift) & u32::from(self.format.blue_max)) as u16,
            })
        } else {
            let index = usize::try_from(raw).unwrap_or(usize::MAX);
            if index >= COLOR_MAP_SIZE {
                return Err(RfbError::encoding(
                    "decode_pixel",
                    format!("color map index {raw} out of range"),
                ));
            }
            Ok(self.palette[index])
        }
    }

    /// Reads `len` raw bytes without pixel conversion, for encodings that
    /// carry opaque pixel or mask data.
    pub async fn read_raw<R: AsyncRead + Unpin>(&self, reader: &mut R, len: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        reader
            .read_exact(&mut data)
            .await
            .map_err(|e| RfbError::io("read_pixel_data", e))?;
        Ok(data)
    }
}

/// Size in bytes of a `width x height` block of raw pixels.
pub fn pixel_data_len(width: u16, height: u16, format: &PixelFormat) -> usize {
    usize::from(width) * usize::from(height) * format.bytes_per_pixel()
}

/// Size in bytes of a one-bit-per-pixel cursor mask, rows padded to whole
/// bytes.
pub fn mask_data_len(width: u16, height: u16) -> usize {
    usize::from(width).div_ceil(8) * usize::from(height)
}
