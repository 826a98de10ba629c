#![forbid(unsafe_code)]

//! RGBA colors carried by sheet render descriptors.

/// 8-bit-per-channel RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    /// Neutral grey used for separators and the drag handle.
    pub const SEPARATOR: Self = Self::rgba(60, 60, 67, 73);
    /// Default sheet surface.
    pub const SYSTEM_BACKGROUND: Self = Self::WHITE;

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Scale alpha by `opacity` (clamped to `[0.0, 1.0]`).
    #[must_use]
    pub fn with_opacity(self, opacity: f32) -> Self {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            a: (self.a as f32 * opacity).round() as u8,
            ..self
        }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if !hex.is_ascii() || !matches!(hex.len(), 6 | 8) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    /// Alpha as a fraction.
    #[must_use]
    pub fn alpha(self) -> f32 {
        self.a as f32 / 255.0
    }
}
