//! eyeline-media: photos on disk, overlays and the interactive window.
//!
//! Loads photos with their embedded orientation applied, derives capture
//! timestamps, draws correction and debug overlays, renders scheduled frames
//! and provides the pixel window that feeds input events to the correction
//! state machines.

pub mod frame;
pub mod overlay;
pub mod photo;
pub mod render;
pub mod window;

use std::path::PathBuf;
use thiserror::Error;

pub use frame::WorkingImage;
pub use photo::{capture_timestamp, import_photos, list_photos, load_oriented};
pub use render::{load_font, render_job, save_jpeg, Caption, RenderSettings};
pub use window::{show_until_key, CoarseView, FineView, PhotoWindow};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("exif: {0}")]
    Exif(exif::Error),
    #[error("font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
    #[error("invalid date format '{0}'")]
    DateFormat(String),
    #[error("record for {0} has no eye positions")]
    IncompleteRecord(String),
    #[error("window: {0}")]
    Window(#[from] minifb::Error),
    #[error("not a directory: {0}")]
    InvalidDirectory(PathBuf),
    #[error("alignment: {0}")]
    Align(#[from] eyeline_core::alignment::AlignError),
}

pub type Result<T> = std::result::Result<T, MediaError>;
