//! Escalating face and eye detection.
//!
//! Faces are searched with progressively smaller minimum sizes and merged
//! into one ordered, de-duplicated list. The largest face, when it covers
//! enough of the image, narrows the eye search to its upper part. Eye
//! cascades are then tried in priority order until some pass yields exactly
//! two candidates.

use crate::types::{Detection, ImageSize, ParameterSet, Point, Rect};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Faces smaller than this share of the image do not narrow the eye search.
const MIN_FACE_FRACTION: f64 = 0.1;
/// Eyes live in the upper part of a head box.
const EYE_REGION_HEIGHT: f64 = 0.6;
const EYES_WANTED: usize = 2;

const FACE_SCALE_FACTOR: f64 = 1.1;
const FACE_MIN_NEIGHBORS: i32 = 3;
const FACE_FIXED_MIN_SIZE: (u32, u32) = (20, 20);
/// Minimum face sizes as fractions of the image's shorter side, tried after the fixed size.
const FACE_MIN_SIZE_FRACTIONS: [f64; 5] = [1.0, 0.7, 0.4, 0.1, 0.01];

const EYE_PARAMETER_SETS: [ParameterSet; 8] = [
    ParameterSet::new(1.1, 3, 0, (20, 20)),
    ParameterSet::new(1.01, 3, 0, (10, 10)),
    ParameterSet::new(1.05, 3, 0, (15, 15)),
    ParameterSet::new(1.025, 3, 0, (10, 10)),
    ParameterSet::new(1.075, 3, 0, (10, 10)),
    ParameterSet::new(1.125, 3, 0, (10, 10)),
    ParameterSet::new(1.15, 3, 0, (15, 15)),
    ParameterSet::new(1.1, 2, 0, (30, 30)),
];

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection resource not found: {0}; check the model directory setting")]
    ResourceMissing(PathBuf),
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detection resource identifiers, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cascade {
    FrontalFace,
    /// Eye detector that tolerates glasses. Tried first.
    EyeTreeEyeglasses,
    Eye,
}

impl Cascade {
    pub fn name(&self) -> &'static str {
        match self {
            Cascade::FrontalFace => "frontal-face",
            Cascade::EyeTreeEyeglasses => "eye-tree-eyeglasses",
            Cascade::Eye => "eye",
        }
    }
}

/// Eye cascades in priority order.
pub const EYE_CASCADES: [Cascade; 2] = [Cascade::EyeTreeEyeglasses, Cascade::Eye];

/// Resolved on-disk resources for every cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePaths {
    pub face: PathBuf,
    pub eyeglasses: PathBuf,
    pub eye: PathBuf,
}

impl CascadePaths {
    /// Resolve resource file names inside `dir`. Every resource must exist.
    pub fn resolve(
        dir: &Path,
        face: &str,
        eyeglasses: &str,
        eye: &str,
    ) -> Result<Self, DetectorError> {
        let check = |name: &str| -> Result<PathBuf, DetectorError> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(DetectorError::ResourceMissing(path))
            }
        };

        Ok(Self {
            face: check(face)?,
            eyeglasses: check(eyeglasses)?,
            eye: check(eye)?,
        })
    }

    pub fn path(&self, cascade: Cascade) -> &Path {
        match cascade {
            Cascade::FrontalFace => &self.face,
            Cascade::EyeTreeEyeglasses => &self.eyeglasses,
            Cascade::Eye => &self.eye,
        }
    }
}

/// The detection primitive: evaluate one cascade with one parameter set.
pub trait FeatureDetector {
    fn detect(
        &mut self,
        image: &GrayImage,
        cascade: Cascade,
        params: &ParameterSet,
    ) -> Result<Vec<Detection>, DetectorError>;

    /// Evaluate a cascade on `region` of `image`. Results are relative to `region`.
    ///
    /// The default crops the region and runs [`FeatureDetector::detect`] on it.
    /// Backends that need the surrounding context override this.
    fn detect_in_region(
        &mut self,
        image: &GrayImage,
        region: Rect,
        cascade: Cascade,
        params: &ParameterSet,
    ) -> Result<Vec<Detection>, DetectorError> {
        let sub = image::imageops::crop_imm(
            image,
            region.x as u32,
            region.y as u32,
            region.width as u32,
            region.height as u32,
        )
        .to_image();
        self.detect(&sub, cascade, params)
    }
}

/// Everything one detection run found, in working-image coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyeSearch {
    /// All distinct face rectangles, in detection order.
    pub faces: Vec<Rect>,
    /// The largest face, if any.
    pub chosen_face: Option<Rect>,
    /// Region the eye search was restricted to, `None` for the whole image.
    pub search_region: Option<Rect>,
    /// Eye rectangles in full-image coordinates, sorted by center x.
    pub eyes: Vec<Rect>,
}

impl EyeSearch {
    /// Eye centers, ascending by x.
    pub fn eye_points(&self) -> Vec<Point> {
        self.eyes.iter().map(Rect::center).collect()
    }
}

/// Face passes: one fixed minimum size, then fractions of the shorter side.
pub fn face_parameter_sets(size: ImageSize) -> Vec<ParameterSet> {
    let min_dim = size.min_dimension() as f64;
    std::iter::once(FACE_FIXED_MIN_SIZE)
        .chain(FACE_MIN_SIZE_FRACTIONS.iter().map(|f| {
            let side = (f * min_dim) as u32;
            (side, side)
        }))
        .map(|min_size| ParameterSet::new(FACE_SCALE_FACTOR, FACE_MIN_NEIGHBORS, 0, min_size))
        .collect()
}

pub fn eye_parameter_sets() -> &'static [ParameterSet] {
    &EYE_PARAMETER_SETS
}

/// Run every face pass and merge the results, keeping first occurrences.
pub fn detect_faces(
    detector: &mut dyn FeatureDetector,
    image: &GrayImage,
) -> Result<Vec<Rect>, DetectorError> {
    let size = ImageSize::new(image.width(), image.height());
    let mut faces: Vec<Rect> = Vec::new();

    for params in face_parameter_sets(size) {
        let found = detector.detect(image, Cascade::FrontalFace, &params)?;
        tracing::debug!(
            count = found.len(),
            min_size = ?params.min_size,
            "face pass"
        );
        for det in found {
            if !faces.contains(&det.rect) {
                faces.push(det.rect);
            }
        }
    }

    Ok(faces)
}

/// Largest face by area. Ties keep the earlier face.
pub fn largest_face(faces: &[Rect]) -> Option<Rect> {
    let mut best: Option<Rect> = None;
    for face in faces {
        match best {
            Some(b) if face.area() <= b.area() => {}
            _ => best = Some(*face),
        }
    }
    best
}

/// Decide where to look for eyes. `None` means the whole image.
pub fn eye_search_region(face: Option<Rect>, size: ImageSize) -> Option<Rect> {
    let face = face?;
    let fraction = face.area() as f64 / size.area() as f64;

    if fraction > MIN_FACE_FRACTION {
        tracing::info!(
            fraction,
            threshold = MIN_FACE_FRACTION,
            "face is large enough; searching eyes in its upper part"
        );
        let upper = Rect::new(
            face.x,
            face.y,
            face.width,
            (face.height as f64 * EYE_REGION_HEIGHT) as i32,
        );
        upper.clamp_to(size.width, size.height)
    } else {
        tracing::info!(
            fraction,
            threshold = MIN_FACE_FRACTION,
            "face too small; searching eyes in the whole image"
        );
        None
    }
}

/// Try eye cascades and parameter sets until a pass yields exactly two eyes.
///
/// Otherwise the first result closest to two is kept. Results are relative
/// to `region`, or to `image` when no region is given.
pub fn detect_eyes(
    detector: &mut dyn FeatureDetector,
    image: &GrayImage,
    region: Option<Rect>,
) -> Result<Vec<Detection>, DetectorError> {
    let mut best: Vec<Detection> = Vec::new();

    'cascades: for cascade in EYE_CASCADES {
        if best.len() == EYES_WANTED {
            break;
        }

        for params in eye_parameter_sets() {
            let found = match region {
                Some(region) => detector.detect_in_region(image, region, cascade, params)?,
                None => detector.detect(image, cascade, params)?,
            };
            tracing::debug!(
                cascade = cascade.name(),
                count = found.len(),
                scale_factor = params.scale_factor,
                min_neighbors = params.min_neighbors,
                min_size = ?params.min_size,
                "eye pass"
            );

            if found.is_empty() {
                continue;
            }
            if found.len() == EYES_WANTED {
                best = found;
                break 'cascades;
            }

            let closer = found.len().abs_diff(EYES_WANTED) < best.len().abs_diff(EYES_WANTED);
            if best.is_empty() || closer {
                best = found;
            }
        }
    }

    Ok(best)
}

/// Full pipeline on a working image: faces, region choice, eyes.
pub fn locate_eyes(
    detector: &mut dyn FeatureDetector,
    image: &GrayImage,
) -> Result<EyeSearch, DetectorError> {
    let size = ImageSize::new(image.width(), image.height());

    let faces = detect_faces(detector, image)?;
    tracing::info!(count = faces.len(), "faces found");

    let chosen_face = largest_face(&faces);
    let search_region = eye_search_region(chosen_face, size);

    let mut eyes: Vec<Rect> = detect_eyes(detector, image, search_region)?
        .iter()
        .map(|d| match search_region {
            Some(region) => d.rect.offset_by(&region),
            None => d.rect,
        })
        .collect();

    eyes.sort_by_key(|r| r.center().x);
    tracing::info!(count = eyes.len(), "eyes found");

    Ok(EyeSearch {
        faces,
        chosen_face,
        search_region,
        eyes,
    })
}
