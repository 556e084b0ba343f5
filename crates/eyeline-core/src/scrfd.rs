//! SCRFD detection backend via ONNX Runtime.
//!
//! Serves every [`Cascade`] from a SCRFD model: face passes return the face
//! boxes, eye passes return square boxes around the two eye landmarks of each
//! face found on the whole image, restricted to the requested region. Only `min_size` of a [`ParameterSet`] affects the result; the other
//! knobs belong to sliding-window cascades and are ignored here.

use crate::detector::{Cascade, CascadePaths, DetectorError, FeatureDetector};
use crate::types::{Detection, ParameterSet, Rect};
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
/// Eye box side relative to the face width.
const EYE_BOX_FRACTION: f32 = 0.25;

/// One decoded face with its five landmarks, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Face {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth]
    landmarks: [(f32, f32); 5],
}

impl Face {
    fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    fn rect(&self) -> Rect {
        Rect::new(
            self.x1 as i32,
            self.y1 as i32,
            self.width() as i32,
            self.height() as i32,
        )
    }

    fn eye_rects(&self) -> [Rect; 2] {
        let side = (self.width() * EYE_BOX_FRACTION).max(1.0);
        let around = |(cx, cy): (f32, f32)| {
            Rect::new(
                (cx - side / 2.0) as i32,
                (cy - side / 2.0) as i32,
                side as i32,
                side as i32,
            )
        };
        [around(self.landmarks[0]), around(self.landmarks[1])]
    }
}

/// Placement of the source image inside the square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> (Self, u32, u32) {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let pad_x = ((INPUT_SIZE - new_w) / 2) as f32;
        let pad_y = ((INPUT_SIZE - new_h) / 2) as f32;
        (Self { scale, pad_x, pad_y }, new_w, new_h)
    }

    fn unmap(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride: (score, bbox, kps).
type StrideSlots = (usize, usize, usize);

struct Model {
    session: Session,
    slots: [StrideSlots; 3],
}

impl Model {
    fn load(path: &Path) -> Result<Self, DetectorError> {
        if !path.is_file() {
            return Err(DetectorError::ResourceMissing(path.to_path_buf()));
        }

        let load_error = |reason: String| DetectorError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(path)
            .map_err(|e| load_error(e.to_string()))?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(load_error(format!(
                "SCRFD model needs 9 outputs (3 strides × score/bbox/kps), got {}",
                names.len()
            )));
        }

        let slots = output_slots(&names);
        tracing::info!(path = %path.display(), outputs = ?names, ?slots, "loaded SCRFD model");

        Ok(Self { session, slots })
    }

    fn run(&mut self, image: &GrayImage) -> Result<Vec<Face>, DetectorError> {
        let (tensor, letterbox) = to_input_tensor(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let mut faces = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.slots[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("kps stride {stride}: {e}")))?;
            faces.extend(decode_stride(scores, bboxes, kps, stride, &letterbox));
        }

        Ok(suppress_overlaps(faces))
    }
}

/// [`FeatureDetector`] backed by SCRFD models, one session per distinct file.
pub struct ScrfdDetector {
    paths: CascadePaths,
    models: HashMap<PathBuf, Model>,
    /// Faces of the most recent image per model; passes over one image share them.
    memo: Option<(PathBuf, GrayImage, Vec<Face>)>,
}

impl ScrfdDetector {
    /// Load every model referenced by `paths`. Fails if any is missing.
    pub fn load(paths: CascadePaths) -> Result<Self, DetectorError> {
        let mut models = HashMap::new();
        for cascade in [Cascade::FrontalFace, Cascade::EyeTreeEyeglasses, Cascade::Eye] {
            let path = paths.path(cascade).to_path_buf();
            if !models.contains_key(&path) {
                let model = Model::load(&path)?;
                models.insert(path, model);
            }
        }

        Ok(Self {
            paths,
            models,
            memo: None,
        })
    }

    fn faces(&mut self, image: &GrayImage, cascade: Cascade) -> Result<Vec<Face>, DetectorError> {
        let path = self.paths.path(cascade).to_path_buf();
        if let Some((memo_path, memo_image, faces)) = &self.memo {
            if *memo_path == path && memo_image.dimensions() == image.dimensions() && memo_image.as_raw() == image.as_raw() {
                return Ok(faces.clone());
            }
        }

        let model = self
            .models
            .get_mut(&path)
            .ok_or_else(|| DetectorError::ResourceMissing(path.clone()))?;
        let faces = model.run(image)?;
        self.memo = Some((path, image.clone(), faces.clone()));
        Ok(faces)
    }
}

impl FeatureDetector for ScrfdDetector {
    fn detect(
        &mut self,
        image: &GrayImage,
        cascade: Cascade,
        params: &ParameterSet,
    ) -> Result<Vec<Detection>, DetectorError> {
        let faces = self.faces(image, cascade)?;
        let candidates = match cascade {
            Cascade::FrontalFace => faces
                .iter()
                .map(|f| Detection { rect: f.rect(), score: f.score })
                .collect(),
            Cascade::EyeTreeEyeglasses | Cascade::Eye => eyes_in_region(&faces, None),
        };
        Ok(at_least(candidates, params))
    }

    /// Eye passes look at the whole image and keep the eyes inside `region`;
    /// the face model cannot find a face whose lower half was cut away.
    fn detect_in_region(
        &mut self,
        image: &GrayImage,
        region: Rect,
        cascade: Cascade,
        params: &ParameterSet,
    ) -> Result<Vec<Detection>, DetectorError> {
        if cascade == Cascade::FrontalFace {
            let sub = image::imageops::crop_imm(
                image,
                region.x as u32,
                region.y as u32,
                region.width as u32,
                region.height as u32,
            )
            .to_image();
            return self.detect(&sub, cascade, params);
        }

        let faces = self.faces(image, cascade)?;
        Ok(at_least(eyes_in_region(&faces, Some(region)), params))
    }
}

/// Landmark eye boxes whose centers fall inside `region`, relative to it.
fn eyes_in_region(faces: &[Face], region: Option<Rect>) -> Vec<Detection> {
    faces
        .iter()
        .flat_map(|f| f.eye_rects().map(|rect| Detection { rect, score: f.score }))
        .filter_map(|d| match region {
            None => Some(d),
            Some(r) => {
                let c = d.rect.center();
                let inside = c.x >= r.x && c.x < r.x + r.width && c.y >= r.y && c.y < r.y + r.height;
                inside.then(|| Detection {
                    rect: Rect::new(d.rect.x - r.x, d.rect.y - r.y, d.rect.width, d.rect.height),
                    score: d.score,
                })
            }
        })
        .collect()
}

fn at_least(candidates: Vec<Detection>, params: &ParameterSet) -> Vec<Detection> {
    let (min_w, min_h) = (params.min_size.0 as i32, params.min_size.1 as i32);
    candidates
        .into_iter()
        .filter(|d| d.rect.width >= min_w && d.rect.height >= min_h)
        .collect()
}

/// Map output names like `score_8` / `bbox_16` / `kps_32` to stride slots.
///
/// Exports with generic names fall back to the usual positional layout:
/// scores 0–2, bboxes 3–5, kps 6–8.
fn output_slots(names: &[String]) -> [StrideSlots; 3] {
    let find = |prefix: &str, stride: u32| names.iter().position(|n| *n == format!("{prefix}_{stride}"));

    let named: Option<Vec<StrideSlots>> = STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match named {
        Some(slots) => [slots[0], slots[1], slots[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized; using positional layout");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Letterbox a grayscale image into a normalized NCHW tensor (three identical channels).
fn to_input_tensor(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let (letterbox, new_w, new_h) = Letterbox::fit(image.width(), image.height());
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let side = INPUT_SIZE as usize;
    // padding normalizes to 0.0
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    let (ox, oy) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let v = (pixel.0[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
        let (tx, ty) = (ox + x as usize, oy + y as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = v;
        }
    }

    (tensor, letterbox)
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: u32,
    letterbox: &Letterbox,
) -> Vec<Face> {
    let cells_x = (INPUT_SIZE / stride) as usize;
    let cells_y = (INPUT_SIZE / stride) as usize;
    let step = stride as f32;
    let mut faces = Vec::new();

    for idx in 0..cells_x * cells_y * ANCHORS_PER_CELL {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCORE_THRESHOLD {
            continue;
        }
        let Some(b) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let Some(k) = kps.get(idx * 10..idx * 10 + 10) else {
            continue;
        };

        let cell = idx / ANCHORS_PER_CELL;
        let ax = (cell % cells_x) as f32 * step;
        let ay = (cell / cells_x) as f32 * step;

        let (x1, y1) = letterbox.unmap((ax - b[0] * step, ay - b[1] * step));
        let (x2, y2) = letterbox.unmap((ax + b[2] * step, ay + b[3] * step));
        let landmarks: [(f32, f32); 5] =
            std::array::from_fn(|i| letterbox.unmap((ax + k[i * 2] * step, ay + k[i * 2 + 1] * step)));

        faces.push(Face {
            x1,
            y1,
            x2,
            y2,
            score,
            landmarks,
        });
    }

    faces
}

/// Greedy non-maximum suppression, highest score first.
fn suppress_overlaps(mut faces: Vec<Face>) -> Vec<Face> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Face> = Vec::new();
    for face in faces {
        if kept.iter().all(|k| iou(k, &face) <= NMS_IOU) {
            kept.push(face);
        }
    }
    kept
}

fn iou(a: &Face, b: &Face) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = w * h;
    let union = a.width() * a.height() + b.width() * b.height() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, size: f32, score: f32) -> Face {
        let eye_y = y1 + size * 0.4;
        Face {
            x1,
            y1,
            x2: x1 + size,
            y2: y1 + size,
            score,
            landmarks: [
                (x1 + size * 0.3, eye_y),
                (x1 + size * 0.7, eye_y),
                (x1 + size * 0.5, y1 + size * 0.6),
                (x1 + size * 0.35, y1 + size * 0.8),
                (x1 + size * 0.65, y1 + size * 0.8),
            ],
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = face(0.0, 0.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        let b = face(200.0, 200.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_suppression_keeps_best_of_overlap() {
        let faces = vec![
            face(5.0, 5.0, 100.0, 0.8),
            face(0.0, 0.0, 100.0, 0.9),
            face(300.0, 300.0, 50.0, 0.7),
        ];
        let kept = suppress_overlaps(faces);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_eye_rects_center_on_landmarks() {
        let f = face(100.0, 100.0, 200.0, 0.9);
        let [left, right] = f.eye_rects();
        assert_eq!(left, Rect::new(135, 155, 50, 50));
        assert_eq!(right, Rect::new(215, 155, 50, 50));
        assert_eq!(left.center().x, 160);
    }

    #[test]
    fn test_region_keeps_landmark_eyes_of_full_face() {
        // upper 60% of the face, as the eye search region
        let f = face(100.0, 100.0, 200.0, 0.9);
        let region = Rect::new(100, 100, 200, 120);

        let eyes = eyes_in_region(&[f], Some(region));
        let rects: Vec<Rect> = eyes.iter().map(|d| d.rect).collect();
        assert_eq!(rects, vec![Rect::new(35, 55, 50, 50), Rect::new(115, 55, 50, 50)]);
        assert_eq!(rects[0].offset_by(&region), f.eye_rects()[0]);
    }

    #[test]
    fn test_region_drops_eyes_of_other_faces() {
        let inside = face(100.0, 100.0, 200.0, 0.9);
        let elsewhere = face(600.0, 100.0, 100.0, 0.8);
        let region = Rect::new(100, 100, 200, 120);

        assert_eq!(eyes_in_region(&[inside, elsewhere], Some(region)).len(), 2);
        assert_eq!(eyes_in_region(&[inside, elsewhere], None).len(), 4);
    }

    #[test]
    fn test_min_size_filters_small_eye_boxes() {
        let f = face(0.0, 0.0, 80.0, 0.9);
        let eyes = eyes_in_region(&[f], None);
        assert_eq!(eyes[0].rect.width, 20);
        assert_eq!(at_least(eyes.clone(), &ParameterSet::new(1.1, 3, 0, (20, 20))).len(), 2);
        assert!(at_least(eyes, &ParameterSet::new(1.1, 2, 0, (30, 30))).is_empty());
    }

    #[test]
    fn test_letterbox_unmap_recovers_source() {
        let (lb, new_w, new_h) = Letterbox::fit(320, 240);
        assert_eq!((new_w, new_h), (640, 480));
        assert_eq!(lb.pad_y, 80.0);

        let (x, y) = lb.unmap((100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y));
        assert!((x - 100.0).abs() < 0.01 && (y - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_output_slots_named_and_positional() {
        let names: Vec<String> = ["bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(output_slots(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);

        let generic: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(output_slots(&generic), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_input_tensor_padding_is_neutral() {
        let image = GrayImage::from_pixel(320, 240, image::Luma([255]));
        let (tensor, _) = to_input_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        // top padding band
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 1, 320, 320]];
        assert!((inside - (255.0 - PIXEL_MEAN) / PIXEL_STD).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        let (lb, _, _) = Letterbox::fit(640, 640);
        let cells = (INPUT_SIZE / 32) as usize;
        let n = cells * cells * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        let mut bboxes = vec![0.0f32; n * 4];
        let kps = vec![0.0f32; n * 10];

        // anchor at cell (1, 1) → (32, 32)
        let idx = (cells + 1) * ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);

        let faces = decode_stride(&scores, &bboxes, &kps, 32, &lb);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].rect(), Rect::new(16, 16, 32, 32));
        assert_eq!(faces[0].landmarks[0], (32.0, 32.0));
    }
}
