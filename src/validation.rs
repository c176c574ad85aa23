//! Input validation for externally sourced protocol values.
//!
//! Every numeric bound the engine enforces against server- or
//! caller-supplied data lives here, together with the text sanitization
//! rules. The checks are pure and deliberately small so each wire parser
//! can call them before trusting a value.

use crate::error::{Result, RfbError};

/// Number of entries in a VNC color map.
pub const COLOR_MAP_SIZE: usize = 256;

/// Maximum framebuffer dimension accepted from ServerInit, per side.
pub const MAX_DIMENSION: u16 = 32768;

/// Maximum framebuffer area (in pixels) accepted from ServerInit.
pub const MAX_FRAMEBUFFER_AREA: u64 = 1024 * 1024 * 1024;

/// Maximum number of rectangles in a single FramebufferUpdate message.
pub const MAX_RECTANGLES_PER_UPDATE: u16 = 10_000;

/// Maximum clipboard text length the client will send.
pub const MAX_CLIPBOARD_LEN: u32 = 1024 * 1024;

/// Maximum clipboard text length accepted from the server.
pub const MAX_SERVER_CLIPBOARD_LEN: u32 = 10 * 1024 * 1024;

/// Maximum desktop name length accepted during ServerInit.
pub const MAX_DESKTOP_NAME_LEN: u32 = 1024 * 1024;

/// Maximum failure-reason length accepted during the handshake.
pub const MAX_REASON_LEN: u32 = 64 * 1024;

/// Maximum number of encodings a client may advertise in SetEncodings.
pub const MAX_ENCODINGS: usize = 100;

/// Largest X11 keysym value accepted in a KeyEvent.
pub const MAX_KEYSYM: u32 = 0x01FF_FFFF;

/// Absolute magnitude cap on encoding type codes.
const MAX_ENCODING_TYPE_MAGNITUDE: i32 = 1_000_000;

/// Validates and parses a 12-byte protocol version banner.
///
/// The only accepted shape is the literal `RFB MMM.mmm\n` with ASCII
/// digits. Returns the parsed `(major, minor)` pair.
pub fn parse_protocol_version(banner: &[u8; 12]) -> Result<(u32, u32)> {
    const OP: &str = "parse_protocol_version";

    if &banner[0..4] != b"RFB " {
        return Err(RfbError::protocol(OP, "banner must start with 'RFB '"));
    }
    if banner[7] != b'.' {
        return Err(RfbError::protocol(OP, "banner format must be RFB XXX.YYY"));
    }
    if banner[11] != b'\n' {
        return Err(RfbError::protocol(OP, "banner must end with newline"));
    }

    let digits = |range: std::ops::Range<usize>| -> Result<u32> {
        let mut value = 0u32;
        for &b in &banner[range] {
            if !b.is_ascii_digit() {
                return Err(RfbError::protocol(
                    OP,
                    "banner version fields must contain only digits",
                ));
            }
            value = value * 10 + u32::from(b - b'0');
        }
        Ok(value)
    };

    let major = digits(4..7)?;
    let minor = digits(8..11)?;
    Ok((major, minor))
}

/// Validates the server-offered security type list.
pub fn validate_security_types(types: &[u8]) -> Result<()> {
    const OP: &str = "validate_security_types";

    if types.is_empty() {
        return Err(RfbError::validation(OP, "security type list cannot be empty"));
    }
    for (i, &ty) in types.iter().enumerate() {
        if ty == 0 {
            return Err(RfbError::validation(
                OP,
                format!("security type 0 (connection failure) at index {i}"),
            ));
        }
    }
    Ok(())
}

/// Validates framebuffer dimensions received during ServerInit or a
/// desktop resize.
pub fn validate_framebuffer_dimensions(width: u16, height: u16) -> Result<()> {
    const OP: &str = "validate_framebuffer_dimensions";

    if width == 0 || height == 0 {
        return Err(RfbError::validation(
            OP,
            "framebuffer dimensions cannot be zero",
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RfbError::validation(
            OP,
            format!("framebuffer dimensions too large: {width}x{height} (max {MAX_DIMENSION})"),
        ));
    }
    let area = u64::from(width) * u64::from(height);
    if area > MAX_FRAMEBUFFER_AREA {
        return Err(RfbError::validation(
            OP,
            format!("framebuffer area too large: {area} pixels (max {MAX_FRAMEBUFFER_AREA})"),
        ));
    }
    Ok(())
}

/// Validates a rectangle against the bounds `(fb_width, fb_height)`.
///
/// A rectangle is valid when both dimensions are non-zero, `x + width` and
/// `y + height` do not overflow `u16`, and the rectangle lies entirely
/// within the bounds.
pub fn validate_rectangle(
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    fb_width: u16,
    fb_height: u16,
) -> Result<()> {
    const OP: &str = "validate_rectangle";

    if width == 0 || height == 0 {
        return Err(RfbError::validation(
            OP,
            "rectangle dimensions cannot be zero",
        ));
    }
    if x.checked_add(width).is_none() || y.checked_add(height).is_none() {
        return Err(RfbError::validation(
            OP,
            "rectangle coordinates would overflow u16",
        ));
    }
    if x + width > fb_width || y + height > fb_height {
        return Err(RfbError::validation(
            OP,
            format!(
                "rectangle ({x},{y},{width},{height}) exceeds framebuffer bounds ({fb_width},{fb_height})"
            ),
        ));
    }
    Ok(())
}

/// Validates an encoding type code for sanity before dispatch.
///
/// Rejects only absurd magnitudes; unknown-but-plausible codes are left to
/// the dispatch table, which reports them as unsupported.
pub fn validate_encoding_type(encoding_type: i32) -> Result<()> {
    const OP: &str = "validate_encoding_type";

    if encoding_type > MAX_ENCODING_TYPE_MAGNITUDE {
        return Err(RfbError::validation(
            OP,
            format!("encoding type too large: {encoding_type}"),
        ));
    }
    if encoding_type < -MAX_ENCODING_TYPE_MAGNITUDE {
        return Err(RfbError::validation(
            OP,
            format!("pseudo-encoding type too negative: {encoding_type}"),
        ));
    }
    Ok(())
}

/// Validates text for transmission or storage.
///
/// Text must be valid UTF-8 (guaranteed by `&str`), within `max_len`
/// bytes, and free of control characters other than `\t`, `\n` and `\r`.
pub fn validate_text(text: &str, max_len: usize) -> Result<()> {
    const OP: &str = "validate_text";

    if text.len() > max_len {
        return Err(RfbError::validation(
            OP,
            format!("text length {} exceeds maximum {max_len}", text.len()),
        ));
    }
    for (i, ch) in text.char_indices() {
        if ch < ' ' && ch != '\t' && ch != '\n' && ch != '\r' {
            return Err(RfbError::validation(
                OP,
                format!("text contains control character at byte {i}"),
            ));
        }
    }
    Ok(())
}

/// Replaces unacceptable characters in text sourced from the wire.
///
/// Control characters other than `\t\n\r` become spaces; non-printable
/// code points become U+FFFD. Printable text passes through unchanged.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\t' | '\n' | '\r' => ch,
            c if c < ' ' || c == '\u{7f}' => ' ',
            c if c.is_control() => '\u{FFFD}',
            c => c,
        })
        .collect()
}

/// Validates a length prefix read from the wire against a maximum.
pub fn validate_message_length(length: u32, max: u32) -> Result<()> {
    const OP: &str = "validate_message_length";

    if length > max {
        return Err(RfbError::validation(
            OP,
            format!("message length {length} exceeds maximum {max}"),
        ));
    }
    Ok(())
}

/// Validates a color map update range: `first + count` must stay within
/// the 256-entry map.
pub fn validate_color_map_range(first: u16, count: u16) -> Result<()> {
    const OP: &str = "validate_color_map_range";

    let end = u32::from(first) + u32::from(count);
    if end > COLOR_MAP_SIZE as u32 {
        return Err(RfbError::validation(
            OP,
            format!(
                "color map range [{first}, {end}) exceeds {COLOR_MAP_SIZE} entries"
            ),
        ));
    }
    Ok(())
}

/// Validates an X11 keysym for a KeyEvent message.
pub fn validate_keysym(keysym: u32) -> Result<()> {
    const OP: &str = "validate_keysym";

    if keysym == 0 {
        return Err(RfbError::validation(OP, "keysym cannot be zero"));
    }
    if keysym > MAX_KEYSYM {
        return Err(RfbError::validation(
            OP,
            format!("keysym value too large: {keysym:#x}"),
        ));
    }
    Ok(())
}

/// Validates pointer coordinates against the framebuffer bounds.
pub fn validate_pointer_position(x: u16, y: u16, fb_width: u16, fb_height: u16) -> Result<()> {
    const OP: &str = "validate_pointer_position";

    if x >= fb_width || y >= fb_height {
        return Err(RfbError::validation(
            OP,
            format!("pointer position ({x},{y}) outside framebuffer ({fb_width},{fb_height})"),
        ));
    }
    Ok(())
}
