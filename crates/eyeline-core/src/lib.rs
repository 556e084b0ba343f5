//! eyeline-core: eye location, correction and timelapse scheduling.
//!
//! Detection runs on a downscaled working image through the
//! [`detector::FeatureDetector`] seam (backed by SCRFD via ONNX Runtime),
//! the operator corrects the result with the state machines in
//! [`correction`], and [`schedule`] lays out the rendered frames.

pub mod alignment;
pub mod correction;
pub mod detector;
pub mod scaling;
pub mod schedule;
pub mod scrfd;
pub mod types;

pub use scaling::ScaleMap;
pub use types::{Detection, ImageSize, Outcome, ParameterSet, PhotoRecord, Point, Rect};
