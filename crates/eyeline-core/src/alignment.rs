//! Eye alignment via 4-DOF similarity transform.
//!
//! Maps the two anchor eyes of a photo onto fixed positions of the output
//! frame: the left eye lands at `(ox·W, oy·H)` and the right eye at
//! `(W − ox·W, oy·H)`. Everything else follows by rotation, uniform scale and
//! translation.

use crate::types::Point;
use image::{Rgb, RgbImage};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AlignError {
    #[error("eye points coincide at ({}, {})", .0.x, .0.y)]
    DegenerateEyes(Point),
    #[error("invalid output size {0}×{1}")]
    InvalidSize(u32, u32),
    #[error("horizontal offset {0} leaves no room between the eyes (must be below 0.5)")]
    InvalidOffset(f64),
}

/// Where the eyes go in the output frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignTarget {
    /// Eye offset as a fraction of the output width and height.
    pub offset_pct: (f64, f64),
    pub dest_size: (u32, u32),
}

impl AlignTarget {
    pub fn new(offset_pct: (f64, f64), dest_size: (u32, u32)) -> Self {
        Self { offset_pct, dest_size }
    }

    /// Output positions of the left and right eye.
    pub fn anchors(&self) -> [(f64, f64); 2] {
        let (w, h) = (self.dest_size.0 as f64, self.dest_size.1 as f64);
        let (ox, oy) = self.offset_pct;
        [(ox * w, oy * h), (w - ox * w, oy * h)]
    }

    /// Reject targets that cannot hold two distinct eyes.
    pub fn validate(&self) -> Result<(), AlignError> {
        let (w, h) = self.dest_size;
        if w == 0 || h == 0 {
            return Err(AlignError::InvalidSize(w, h));
        }
        if self.offset_pct.0 >= 0.5 {
            return Err(AlignError::InvalidOffset(self.offset_pct.0));
        }
        Ok(())
    }
}

/// Estimate a 2×3 similarity transform (4-DOF: scale, rotation, translation)
/// from `src` points to `dst` points using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<[f64; 6]> {
    // For each pair (sx, sy) -> (dx, dy):
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f64; 16];
    let mut atb = [0.0f64; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb)?;
    Some([a, -b, tx, b, a, ty])
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f64; 16], atb: &[f64; 4]) -> Option<[f64; 4]> {
    let mut m = [[0.0f64; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i * 4..i * 4 + 4]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let max_row = (col..4)
            .max_by(|&r, &s| m[r][col].abs().total_cmp(&m[s][col].abs()))
            .unwrap_or(col);
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-9 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f64; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    Some(x)
}

/// Apply a 2×3 similarity warp to produce an output image.
///
/// Uses bilinear interpolation. Out-of-bounds pixels are filled with black.
fn warp_affine(src: &RgbImage, matrix: &[f64; 6], out_width: u32, out_height: u32) -> RgbImage {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = RgbImage::new(out_width, out_height);

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;
    let (sw, sh) = (src.width() as i32, src.height() as i32);

    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        // src = M_inv * (dst - t)
        let dx = ox as f64 - tx;
        let dy = oy as f64 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f64;
        let fy = sy - y0 as f64;

        let sample = |x: i32, y: i32, c: usize| -> f64 {
            if x >= 0 && x < sw && y >= 0 && y < sh {
                src.get_pixel(x as u32, y as u32).0[c] as f64
            } else {
                0.0
            }
        };

        let mut rgb = [0u8; 3];
        for (c, value) in rgb.iter_mut().enumerate() {
            let v = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(rgb);
    }

    output
}

/// Rotate, scale and crop `image` so both eyes land on the target anchors.
pub fn align_eyes(
    image: &RgbImage,
    left_eye: Point,
    right_eye: Point,
    target: &AlignTarget,
) -> Result<RgbImage, AlignError> {
    target.validate()?;
    if left_eye == right_eye {
        return Err(AlignError::DegenerateEyes(left_eye));
    }

    let src = [
        (left_eye.x as f64, left_eye.y as f64),
        (right_eye.x as f64, right_eye.y as f64),
    ];
    let matrix =
        estimate_similarity_transform(&src, &target.anchors()).ok_or(AlignError::DegenerateEyes(left_eye))?;
    tracing::trace!(?matrix, ?left_eye, ?right_eye, "alignment transform");

    let (w, h) = target.dest_size;
    Ok(warp_affine(image, &matrix, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[f64; 6], (x, y): (f64, f64)) -> (f64, f64) {
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    #[test]
    fn test_identity_transform() {
        let pts = [(38.0, 51.0), (73.0, 51.0)];
        let m = estimate_similarity_transform(&pts, &pts).unwrap();

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        let target = AlignTarget::new((0.25, 0.5), (400, 200));
        let src = [(100.0, 100.0), (200.0, 100.0)];
        let m = estimate_similarity_transform(&src, &target.anchors()).unwrap();

        assert!((m[0] - 2.0).abs() < 1e-3, "a = {}", m[0]);
        assert!(m[3].abs() < 1e-3, "b = {}", m[3]);
        assert!((m[2] + 100.0).abs() < 1e-2, "tx = {}", m[2]);
        assert!((m[5] + 100.0).abs() < 1e-2, "ty = {}", m[5]);
    }

    #[test]
    fn test_rotated_eyes_map_onto_anchors() {
        let target = AlignTarget::new((0.43, 0.425), (1920, 1080));
        let src = [(300.0, 400.0), (420.0, 520.0)];
        let anchors = target.anchors();
        let m = estimate_similarity_transform(&src, &anchors).unwrap();

        for (s, d) in src.iter().zip(anchors) {
            let (x, y) = apply(&m, *s);
            assert!((x - d.0).abs() < 0.5 && (y - d.1).abs() < 0.5, "{s:?} -> ({x}, {y}), want {d:?}");
        }
    }

    #[test]
    fn test_warp_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let out = warp_affine(&image, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 320, 100);
        assert_eq!(out.dimensions(), (320, 100));
        assert_eq!(out.get_pixel(10, 10), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_outside_source_is_black() {
        let image = RgbImage::from_pixel(100, 100, Rgb([200, 10, 10]));
        // scale 2, left eye (40, 50) -> (180, 100)
        let target = AlignTarget::new((0.45, 0.5), (400, 200));
        let out = align_eyes(&image, Point::new(40, 50), Point::new(60, 50), &target).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(200, 100), &Rgb([200, 10, 10]));
    }

    #[test]
    fn test_eye_patch_lands_on_anchor() {
        let mut image = RgbImage::new(200, 200);
        for y in 58..63 {
            for x in 78..83 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let target = AlignTarget::new((0.3, 0.4), (200, 100));
        let out = align_eyes(&image, Point::new(80, 60), Point::new(120, 60), &target).unwrap();

        let [(ax, ay), _] = target.anchors();
        let (ax, ay) = (ax.round() as u32, ay.round() as u32);
        let brightest = (ay - 1..=ay + 1)
            .flat_map(|y| (ax - 1..=ax + 1).map(move |x| (x, y)))
            .map(|(x, y)| out.get_pixel(x, y).0[0])
            .max()
            .unwrap();
        assert!(brightest > 100, "expected bright patch near ({ax}, {ay}), max={brightest}");
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let image = RgbImage::new(10, 10);
        let target = AlignTarget::new((0.43, 0.425), (64, 64));
        let p = Point::new(5, 5);
        assert_eq!(align_eyes(&image, p, p, &target), Err(AlignError::DegenerateEyes(p)));

        let wide = AlignTarget::new((0.5, 0.4), (64, 64));
        assert_eq!(
            align_eyes(&image, p, Point::new(8, 5), &wide),
            Err(AlignError::InvalidOffset(0.5))
        );

        let empty = AlignTarget::new((0.3, 0.4), (0, 64));
        assert_eq!(
            align_eyes(&image, p, Point::new(8, 5), &empty),
            Err(AlignError::InvalidSize(0, 64))
        );
    }
}
