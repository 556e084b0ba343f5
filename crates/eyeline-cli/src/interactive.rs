//! Detection followed by coarse and fine correction of one photo.

use anyhow::{Context, Result};
use eyeline_core::correction::{self, CoarseSession, FineSession, FineSettings};
use eyeline_core::detector::{locate_eyes, CascadePaths};
use eyeline_core::scrfd::ScrfdDetector;
use eyeline_core::{Outcome, Point};
use eyeline_media::overlay::detection_debug_frame;
use eyeline_media::{show_until_key, CoarseView, FineView, WorkingImage};

const EYE_NAMES: [&str; 2] = ["left eye", "right eye"];

/// Keeps the fine zoom settings of a whole run and the detector, if any.
pub struct Corrector {
    zoom_size: u32,
    fine: Option<FineSettings>,
    detector: Option<ScrfdDetector>,
    detection_debug: bool,
}

impl Corrector {
    pub fn new(zoom_size: u32) -> Self {
        Self {
            zoom_size,
            fine: None,
            detector: None,
            detection_debug: false,
        }
    }

    /// Load the detection models. Missing resources are fatal.
    pub fn with_detector(mut self, paths: CascadePaths, detection_debug: bool) -> Result<Self> {
        let detector = ScrfdDetector::load(paths).context("loading detection models")?;
        self.detector = Some(detector);
        self.detection_debug = detection_debug;
        Ok(self)
    }

    /// Detected eye centers on the working image, ascending by x.
    pub fn detect(&mut self, title: &str, image: &WorkingImage) -> Result<Vec<Point>> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(Vec::new());
        };
        let search = locate_eyes(detector, &image.detection_gray())?;

        if self.detection_debug {
            let frame = detection_debug_frame(&image.working, &search);
            let key = show_until_key(&format!("{title} (detection)"), &frame)?;
            tracing::debug!(?key, "detection debug dismissed");
        }
        Ok(search.eye_points())
    }

    /// Whole-image correction on the working image. Returns working-space points.
    pub fn coarse(&mut self, title: &str, image: &WorkingImage, seeds: Vec<Point>) -> Result<Outcome<Vec<Point>>> {
        let mut session = CoarseSession::new(image.working_size(), seeds);
        let mut view = CoarseView::open(title, &image.working)?;
        Ok(match correction::run(&mut session, &mut view)? {
            Outcome::Committed(()) => Outcome::Committed(session.into_points()),
            Outcome::Cancelled => Outcome::Cancelled,
        })
    }

    /// Pixel-precise correction of both eyes on the native image.
    pub fn fine(&mut self, title: &str, image: &WorkingImage, eyes: (Point, Point)) -> Result<Outcome<(Point, Point)>> {
        let size = image.native_size();
        let zoom_size = self.zoom_size;
        let settings = self
            .fine
            .get_or_insert_with(|| FineSettings::for_image(size, zoom_size));

        let mut result = [eyes.0, eyes.1];
        for (index, point) in result.iter_mut().enumerate() {
            let mut view = FineView::open(&format!("{title} ({})", EYE_NAMES[index]), &image.native, settings.zoom_size)?;
            let mut session = FineSession::new(&mut *settings, size, index, *point);
            if correction::run(&mut session, &mut view)?.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            *point = session.point();
        }
        Ok(Outcome::Committed((result[0], result[1])))
    }
}

/// The two coarse points, once the session committed exactly two.
pub fn pair(points: &[Point]) -> Option<(Point, Point)> {
    match points {
        [left, right] => Some((*left, *right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_requires_exactly_two() {
        let a = Point::new(1, 2);
        let b = Point::new(3, 4);
        assert_eq!(pair(&[a, b]), Some((a, b)));
        assert_eq!(pair(&[a]), None);
        assert_eq!(pair(&[a, b, a]), None);
    }

    #[test]
    fn test_without_detector_nothing_is_found() {
        let mut corrector = Corrector::new(640);
        let image = WorkingImage::new(image::RgbImage::new(10, 10), 1024);
        assert!(corrector.detect("x", &image).unwrap().is_empty());
    }
}
