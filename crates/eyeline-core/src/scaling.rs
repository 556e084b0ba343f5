//! Mapping between the native photo and the downscaled working image.
//!
//! Both directions truncate toward zero, so a native → working → native round
//! trip may land a few pixels short of where it started. Callers that need the
//! stored native coordinates must keep them instead of re-deriving them.

use crate::types::{ImageSize, Point};

/// Scale relation between a native image and its working copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleMap {
    scale: f64,
    native: ImageSize,
    working: ImageSize,
}

impl ScaleMap {
    /// Compute the working scale so that neither side exceeds `max_dimension`.
    ///
    /// Images already within bounds keep a scale of exactly 1.0.
    pub fn new(native: ImageSize, max_dimension: u32) -> Self {
        let longest = native.max_dimension();
        let scale = if max_dimension > 0 && longest > max_dimension {
            longest as f64 / max_dimension as f64
        } else {
            1.0
        };

        let working = ImageSize::new(
            (native.width as f64 / scale) as u32,
            (native.height as f64 / scale) as u32,
        );

        Self {
            scale,
            native,
            working,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn native_size(&self) -> ImageSize {
        self.native
    }

    pub fn working_size(&self) -> ImageSize {
        self.working
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0
    }

    /// Native → working, truncating.
    pub fn to_working(&self, p: Point) -> Point {
        Point::new(
            (p.x as f64 / self.scale) as i32,
            (p.y as f64 / self.scale) as i32,
        )
    }

    /// Working → native, truncating.
    pub fn to_native(&self, p: Point) -> Point {
        Point::new(
            (p.x as f64 * self.scale) as i32,
            (p.y as f64 * self.scale) as i32,
        )
    }
}
