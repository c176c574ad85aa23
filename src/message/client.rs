//! Client-to-server message frames (RFC 6143 §7.5).
//!
//! Each builder produces one contiguous big-endian frame. Building is
//! separated from sending so the exact byte sequences can be asserted in
//! tests; [`Connection`](crate::connection::Connection) validates inputs
//! and writes each frame whole under its write lock.

use bytes::{BufMut, BytesMut};

use crate::encoding::EncodingType;
use crate::pixel::PixelFormat;

/// Message type: SetPixelFormat.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;
/// Message type: SetEncodings.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;
/// Message type: FramebufferUpdateRequest.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
/// Message type: KeyEvent.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;
/// Message type: PointerEvent.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;
/// Message type: ClientCutText.
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

/// Pointer button state for PointerEvent messages.
///
/// Bit set means pressed. Wheel events are reported as press/release
/// pairs of the wheel bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonMask(pub u8);

impl ButtonMask {
    /// No buttons pressed.
    pub const NONE: ButtonMask = ButtonMask(0);
    /// Left button.
    pub const LEFT: ButtonMask = ButtonMask(1);
    /// Middle button.
    pub const MIDDLE: ButtonMask = ButtonMask(2);
    /// Right button.
    pub const RIGHT: ButtonMask = ButtonMask(4);
    /// Scroll wheel up.
    pub const WHEEL_UP: ButtonMask = ButtonMask(8);
    /// Scroll wheel down.
    pub const WHEEL_DOWN: ButtonMask = ButtonMask(16);
    /// Auxiliary button 6.
    pub const BUTTON_6: ButtonMask = ButtonMask(32);
    /// Auxiliary button 7.
    pub const BUTTON_7: ButtonMask = ButtonMask(64);
    /// Auxiliary button 8.
    pub const BUTTON_8: ButtonMask = ButtonMask(128);

    /// Whether every button in `other` is pressed in `self`.
    pub const fn contains(self, other: ButtonMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ButtonMask {
    type Output = ButtonMask;

    fn bitor(self, rhs: ButtonMask) -> ButtonMask {
        ButtonMask(self.0 | rhs.0)
    }
}

/// Builds a SetPixelFormat frame: type, 3 bytes padding, 16-byte format.
pub fn set_pixel_format(format: &PixelFormat) -> BytesMut {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    buf.put_bytes(0, 3);
    format.write_to(&mut buf);
    buf
}

/// Builds a SetEncodings frame: type, 1 byte padding, count, type codes.
pub fn set_encodings(encodings: &[EncodingType]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + encodings.len() * 4);
    buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
    buf.put_u8(0);
    buf.put_u16(encodings.len() as u16);
    for encoding in encodings {
        buf.put_i32(encoding.code());
    }
    buf
}

/// Builds a FramebufferUpdateRequest frame.
pub fn framebuffer_update_request(
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(u8::from(incremental));
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
    buf
}

/// Builds a KeyEvent frame: type, down flag, 2 bytes padding, keysym.
pub fn key_event(down: bool, keysym: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(CLIENT_MSG_KEY_EVENT);
    buf.put_u8(u8::from(down));
    buf.put_bytes(0, 2);
    buf.put_u32(keysym);
    buf
}

/// Builds a PointerEvent frame: type, button mask, x, y.
pub fn pointer_event(mask: ButtonMask, x: u16, y: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(CLIENT_MSG_POINTER_EVENT);
    buf.put_u8(mask.0);
    buf.put_u16(x);
    buf.put_u16(y);
    buf
}

/// Builds a ClientCutText frame: type, 3 bytes padding, length, text.
///
/// `text` must already be encoded as Latin-1 bytes, validated and
/// sanitized.
pub fn client_cut_text(text: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8 + text.len());
    buf.put_u8(CLIENT_MSG_CLIENT_CUT_TEXT);
    buf.put_bytes(0, 3);
    buf.put_u32(text.len() as u32);
    buf.put_slice(text);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_mask_values() {
        assert_eq!(ButtonMask::LEFT.0, 1);
        assert_eq!(ButtonMask::MIDDLE.0, 2);
        assert_eq!(ButtonMask::RIGHT.0, 4);
        assert_eq!(ButtonMask::WHEEL_UP.0, 8);
        assert_eq!(ButtonMask::WHEEL_DOWN.0, 16);
        assert_eq!(ButtonMask::BUTTON_8.0, 128);
    }

    #[test]
    fn test_button_mask_combination() {
        let mask = ButtonMask::LEFT | ButtonMask::RIGHT;
        assert_eq!(mask.0, 5);
        assert!(mask.contains(ButtonMask::LEFT));
        assert!(mask.contains(ButtonMask::RIGHT));
        assert!(!mask.contains(ButtonMask::MIDDLE));
        assert!(ButtonMask::NONE.contains(ButtonMask::NONE));
    }

    #[test]
    fn test_set_pixel_format_frame() {
        let frame = set_pixel_format(&PixelFormat::rgb888());
        assert_eq!(frame.len(), 20);
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..4], &[0, 0, 0]);
        assert_eq!(&frame[4..20], &PixelFormat::rgb888().to_wire());
    }

    #[test]
    fn test_set_encodings_frame() {
        let frame = set_encodings(&[EncodingType::Hextile, EncodingType::DesktopSize]);
        assert_eq!(frame.len(), 4 + 8);
        assert_eq!(frame[0], 2);
        assert_eq!(frame[1], 0);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 2);
        assert_eq!(
            i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
            5
        );
        assert_eq!(
            i32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]),
            -223
        );
    }

    #[test]
    fn test_set_encodings_empty() {
        let frame = set_encodings(&[]);
        assert_eq!(frame.len(), 4);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 0);
    }

    #[test]
    fn test_framebuffer_update_request_frame() {
        let frame = framebuffer_update_request(true, 10, 20, 800, 600);
        assert_eq!(frame.len(), 10);
        assert_eq!(frame[0], 3);
        assert_eq!(frame[1], 1);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 10);
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 20);
        assert_eq!(u16::from_be_bytes([frame[6], frame[7]]), 800);
        assert_eq!(u16::from_be_bytes([frame[8], frame[9]]), 600);
    }

    #[test]
    fn test_framebuffer_update_request_non_incremental() {
        let frame = framebuffer_update_request(false, 0, 0, 1, 1);
        assert_eq!(frame[1], 0);
    }

    #[test]
    fn test_key_event_frame() {
        let frame = key_event(true, 0xFF0D);
        assert_eq!(frame.len(), 8);
        assert_eq!(frame[0], 4);
        assert_eq!(frame[1], 1);
        assert_eq!(&frame[2..4], &[0, 0]);
        assert_eq!(
            u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
            0xFF0D
        );

        let release = key_event(false, 0x0041);
        assert_eq!(release[1], 0);
    }

    #[test]
    fn test_pointer_event_frame() {
        let frame = pointer_event(ButtonMask::LEFT, 150, 300);
        assert_eq!(frame.len(), 6);
        assert_eq!(frame[0], 5);
        assert_eq!(frame[1], 1);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 150);
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 300);
    }

    #[test]
    fn test_client_cut_text_frame() {
        let frame = client_cut_text(b"hi");
        assert_eq!(frame.len(), 10);
        assert_eq!(frame[0], 6);
        assert_eq!(&frame[1..4], &[0, 0, 0]);
        assert_eq!(
            u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
            2
        );
        assert_eq!(&frame[8..], b"hi");
    }

    #[test]
    fn test_client_cut_text_empty() {
        let frame = client_cut_text(b"");
        assert_eq!(frame.len(), 8);
        assert_eq!(
            u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
            0
        );
    }
}
