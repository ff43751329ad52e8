use std::fmt;

use serde::{Deserialize, Serialize};

/// An integer pixel coordinate.
///
/// Also used for curve control points and curve values, where `x` is the
/// input level and `y` the output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in pixel coordinates.
///
/// `x`/`y` is the top-left corner; `width`/`height` may be zero or
/// negative, in which case the rectangle is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image of the given dimensions.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn from_dimensions(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.width as i32, dimensions.height as i32)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// One past the last column.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// One past the last row.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[must_use]
    pub const fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// The overlapping part of two rectangles, or an empty rectangle.
    #[must_use]
    pub fn intersected(&self, other: &Self) -> Self {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Self::default();
        }
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Channel bit depth of a [`PixelBuffer`](crate::PixelBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Depth {
    #[default]
    Eight,
    Sixteen,
}

impl Depth {
    #[must_use]
    pub const fn from_sixteen_bit(sixteen_bit: bool) -> Self {
        if sixteen_bit { Self::Sixteen } else { Self::Eight }
    }

    #[must_use]
    pub const fn is_sixteen_bit(self) -> bool {
        matches!(self, Self::Sixteen)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Largest channel value: 255 or 65535.
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Eight => 255,
            Self::Sixteen => 65535,
        }
    }

    /// Number of distinct channel values: 256 or 65536.
    #[must_use]
    pub const fn segments(self) -> usize {
        self.max_value() as usize + 1
    }
}

/// Clockwise quarter-turn rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    Rot90,
    Rot180,
    Rot270,
}

/// Mirror axis. `Horizontal` swaps left and right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flip {
    Horizontal,
    Vertical,
}

/// A color channel selector, shared by histograms, levels, curves and BCG.
///
/// The numeric values are the ones stored in filter actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// All color channels, or `max(r, g, b)` for histograms.
    #[default]
    Luminosity,
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub const ALL: [Self; 5] = [
        Self::Luminosity,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Alpha,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Luminosity => 0,
            Self::Red => 1,
            Self::Green => 2,
            Self::Blue => 3,
            Self::Alpha => 4,
        }
    }

    /// Inverse of [`index`](Self::index); out of range values are `None`.
    #[must_use]
    pub const fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Luminosity),
            1 => Some(Self::Red),
            2 => Some(Self::Green),
            3 => Some(Self::Blue),
            4 => Some(Self::Alpha),
            _ => None,
        }
    }
}

/// Errors that end a single filter run.
///
/// Everything else (empty hot pixel lists, flat histograms, unknown
/// parameters) degrades to a no-op instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum FilterError {
    /// Two cooperating buffers disagree on their dimensions.
    #[error("image geometry mismatch: expected {expected}, found {found}")]
    GeometryMismatch {
        expected: Dimensions,
        found: Dimensions,
    },

    /// Two cooperating buffers disagree on their channel depth.
    #[error("bit depth mismatch: expected {expected} bits, found {found} bits")]
    DepthMismatch { expected: u32, found: u32 },

    /// The source buffer is null (zero sized or failed allocation).
    #[error("image is null")]
    NullImage,

    /// The filter settings cannot be applied.
    #[error("invalid filter settings: {0}")]
    InvalidSettings(String),
}

/// Failure to decode the portable text form of a filter action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionDecodeError {
    #[error("action text is not valid UTF-8")]
    InvalidUtf8,

    #[error("no action found in text")]
    Empty,

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl ActionDecodeError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_overlapping() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -3, 10, 6);
        assert_eq!(a.intersected(&b), Rect::new(5, 0, 5, 3));
    }

    #[test]
    fn rect_intersection_disjoint_is_empty() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(4, 0, 4, 4);
        assert!(a.intersected(&b).is_empty());
    }

    #[test]
    fn rect_edges_saturate() {
        let r = Rect::new(i32::MAX - 1, i32::MAX, 5, 1);
        assert_eq!(r.right(), i32::MAX);
        assert_eq!(r.bottom(), i32::MAX);
        let bounds = Rect::new(0, 0, 4, 4);
        assert!(r.intersected(&bounds).is_empty());
        let wide = Rect::new(-10, 0, i32::MAX, 2);
        assert_eq!(wide.intersected(&bounds), Rect::new(0, 0, 4, 2));
    }

    #[test]
    fn rect_contains_excludes_far_edge() {
        let r = Rect::new(1, 1, 2, 2);
        assert!(r.contains(Point::new(1, 1)));
        assert!(r.contains(Point::new(2, 2)));
        assert!(!r.contains(Point::new(3, 2)));
    }

    #[test]
    fn depth_constants() {
        assert_eq!(Depth::Eight.segments(), 256);
        assert_eq!(Depth::Sixteen.max_value(), 65535);
        assert_eq!(Depth::from_sixteen_bit(true), Depth::Sixteen);
    }

    #[test]
    fn channel_index_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_index(channel.index() as i64), Some(channel));
        }
        assert_eq!(Channel::from_index(7), None);
    }

    #[test]
    fn filter_error_display() {
        let err = FilterError::DepthMismatch {
            expected: 8,
            found: 16,
        };
        assert_eq!(
            err.to_string(),
            "bit depth mismatch: expected 8 bits, found 16 bits"
        );
    }

    #[test]
    fn filter_error_serde_round_trip() {
        let err = FilterError::GeometryMismatch {
            expected: Dimensions {
                width: 2,
                height: 3,
            },
            found: Dimensions {
                width: 4,
                height: 5,
            },
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: FilterError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
