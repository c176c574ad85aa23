//! Color values and the thread-safe indexed color map.
//!
//! Components are 16-bit regardless of the wire depth: the pixel decoder
//! zero-extends narrower wire components into the low bits and stores the
//! raw unscaled value. Scaling to display ranges is a consumer concern.

use std::sync::{PoisonError, RwLock};

use crate::error::{Result, RfbError};
use crate::validation::{validate_color_map_range, COLOR_MAP_SIZE};

/// An RGB color with 16-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    /// Red component (0-65535).
    pub r: u16,
    /// Green component (0-65535).
    pub g: u16,
    /// Blue component (0-65535).
    pub b: u16,
}

impl Color {
    /// Pure black.
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    /// Pure white.
    pub const WHITE: Color = Color {
        r: 65535,
        g: 65535,
        b: 65535,
    };
    /// Pure red.
    pub const RED: Color = Color {
        r: 65535,
        g: 0,
        b: 0,
    };
    /// Pure green.
    pub const GREEN: Color = Color {
        r: 0,
        g: 65535,
        b: 0,
    };
    /// Pure blue.
    pub const BLUE: Color = Color {
        r: 0,
        g: 0,
        b: 65535,
    };

    /// Creates a color from 16-bit components.
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Color { r, g, b }
    }

    /// Creates a full-range color from 8-bit components (`x * 257`).
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Color {
            r: r as u16 * 257,
            g: g as u16 * 257,
            b: b as u16 * 257,
        }
    }

    /// Scales the components down to 8-bit values (`x / 257`).
    ///
    /// Only meaningful for colors that actually span the 16-bit range,
    /// such as color map entries; raw decoded pixel components are stored
    /// unscaled and must be scaled against the pixel format's maxima
    /// instead.
    pub const fn to_rgb8(self) -> (u8, u8, u8) {
        ((self.r / 257) as u8, (self.g / 257) as u8, (self.b / 257) as u8)
    }
}

/// Thread-safe 256-entry palette for indexed color modes.
///
/// The map carries its own lock so pixel decoding and server-driven
/// updates can interleave without touching the wider session lock.
/// Freshly constructed maps hold a grayscale ramp; switching the
/// connection to indexed mode via SetPixelFormat resets all entries to
/// zero, after which the server populates them with SetColorMapEntries.
#[derive(Debug)]
pub struct ColorMap {
    entries: RwLock<[Color; COLOR_MAP_SIZE]>,
}

impl ColorMap {
    /// Creates a color map holding the default grayscale ramp
    /// (`R = G = B = index * 257`).
    pub fn grayscale() -> Self {
        let mut entries = [Color::BLACK; COLOR_MAP_SIZE];
        for (i, entry) in entries.iter_mut().enumerate() {
            let value = (i * 257) as u16;
            *entry = Color::new(value, value, value);
        }
        ColorMap {
            entries: RwLock::new(entries),
        }
    }

    /// Creates a color map with every entry set to zero.
    pub fn zeroed() -> Self {
        ColorMap {
            entries: RwLock::new([Color::BLACK; COLOR_MAP_SIZE]),
        }
    }

    /// Returns the color at `index`.
    pub fn get(&self, index: u8) -> Color {
        self.read()[usize::from(index)]
    }

    /// Replaces the color at `index`.
    pub fn set(&self, index: u8, color: Color) {
        self.write()[usize::from(index)] = color;
    }

    /// Replaces the consecutive entries `[first, first + colors.len())`.
    ///
    /// The whole range is applied under a single write guard, so readers
    /// never observe a partially applied update.
    pub fn set_range(&self, first: u16, colors: &[Color]) -> Result<()> {
        let count = u16::try_from(colors.len()).map_err(|_| {
            RfbError::validation("color_map_set_range", "too many colors for one update")
        })?;
        validate_color_map_range(first, count)?;

        let mut entries = self.write();
        for (i, color) in colors.iter().enumerate() {
            entries[usize::from(first) + i] = *color;
        }
        Ok(())
    }

    /// Returns a copy of the consecutive entries `[first, first + count)`.
    pub fn get_range(&self, first: u16, count: u16) -> Result<Vec<Color>> {
        validate_color_map_range(first, count)?;
        let entries = self.read();
        let start = usize::from(first);
        Ok(entries[start..start + usize::from(count)].to_vec())
    }

    /// Returns a copy of the full palette.
    ///
    /// Pixel decoding snapshots the palette once per rectangle so a
    /// concurrent update cannot change colors mid-decode.
    pub fn snapshot(&self) -> [Color; COLOR_MAP_SIZE] {
        *self.read()
    }

    /// Resets every entry to zero, as required after SetPixelFormat.
    pub fn reset(&self) {
        *self.write() = [Color::BLACK; COLOR_MAP_SIZE];
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, [Color; COLOR_MAP_SIZE]> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, [Color; COLOR_MAP_SIZE]> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        ColorMap::grayscale()
    }
}
