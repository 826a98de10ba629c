#![forbid(unsafe_code)]

//! Logical-point geometry used by sheet layout.
//!
//! All lengths are `f32` logical points with the y axis pointing down, so a
//! positive vertical offset moves the sheet toward the bottom of the screen.

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero or negative.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A point in logical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin with the given size.
    #[must_use]
    pub const fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    #[must_use]
    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    #[must_use]
    pub fn right(self) -> f32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(self) -> f32 {
        self.y + self.height
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.size().is_empty()
    }

    /// Translate vertically by `dy`.
    #[must_use]
    pub fn offset_y(self, dy: f32) -> Self {
        Self { y: self.y + dy, ..self }
    }

    /// Half-open containment test (`[x, right) × [y, bottom)`).
    #[must_use]
    pub fn contains(self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }
}

/// Size proposed by a parent during measurement.
///
/// `None` on an axis means "unconstrained": the child reports its natural
/// (ideal) length on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeProposal {
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl SizeProposal {
    /// No constraint on either axis.
    pub const UNSPECIFIED: Self = Self {
        width: None,
        height: None,
    };

    /// Fixed width, natural height: how sheet content is measured.
    #[must_use]
    pub const fn width(width: f32) -> Self {
        Self {
            width: Some(width),
            height: None,
        }
    }

    /// Both axes proposed.
    #[must_use]
    pub const fn exact(size: Size) -> Self {
        Self {
            width: Some(size.width),
            height: Some(size.height),
        }
    }
}

/// Tag attached to a hit-test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HitRegion {
    #[default]
    None,
    Custom(u8),
}
