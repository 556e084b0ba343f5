use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle. Two rectangles with identical fields are the same candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Integer middle point, truncating half extents.
    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width as f64 / 2.0) as i32,
            self.y + (self.height as f64 / 2.0) as i32,
        )
    }

    /// Translate a rectangle expressed relative to `outer` into outer's space.
    pub fn offset_by(&self, outer: &Rect) -> Rect {
        Rect::new(outer.x + self.x, outer.y + self.y, self.width, self.height)
    }

    /// Intersect with an image of the given size. Returns `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width).min(width as i32);
        let y1 = (self.y + self.height).min(height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// A candidate rectangle returned by the detection capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub rect: Rect,
    /// Backend-specific support for the candidate (neighbor count or confidence).
    pub score: f32,
}

/// Tuning knobs handed to the detection capability for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub flags: i32,
    pub min_size: (u32, u32),
}

impl ParameterSet {
    pub const fn new(scale_factor: f64, min_neighbors: i32, flags: i32, min_size: (u32, u32)) -> Self {
        Self {
            scale_factor,
            min_neighbors,
            flags,
            min_size,
        }
    }
}

/// Stored eye coordinates of one photo, keyed by file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub filename: String,
    pub captured_at: NaiveDateTime,
    pub left_eye: Option<Point>,
    pub right_eye: Option<Point>,
}

impl PhotoRecord {
    /// A record registered before its eyes were corrected.
    pub fn pending(filename: impl Into<String>, captured_at: NaiveDateTime) -> Self {
        Self {
            filename: filename.into(),
            captured_at,
            left_eye: None,
            right_eye: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.left_eye.is_some() && self.right_eye.is_some()
    }

    /// Both anchor points, if the record is complete.
    pub fn eyes(&self) -> Option<(Point, Point)> {
        Some((self.left_eye?, self.right_eye?))
    }

    pub fn capture_date(&self) -> NaiveDate {
        self.captured_at.date()
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Result of an interactive step that the operator may abandon.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Committed(T),
    /// The operator asked to quit; nothing from the current photo is persisted.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}
