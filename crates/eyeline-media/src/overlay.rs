//! Marks drawn over photos while correcting, debugging and rendering.

use ab_glyph::{FontVec, PxScale};
use eyeline_core::correction::{CoarseSession, FineSession};
use eyeline_core::detector::EyeSearch;
use eyeline_core::{Point, Rect};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_cross_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};

pub const FACE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const CHOSEN_FACE_COLOR: Rgb<u8> = Rgb([122, 0, 255]);
pub const EYE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const TEXT_MARGIN: i32 = 10;

/// Marker color for the eye at `index`; lighter when it is selected.
pub fn marker_color(index: usize, selected: bool) -> Rgb<u8> {
    match (index, selected) {
        (0, false) => Rgb([0, 255, 0]),
        (0, true) => Rgb([200, 255, 200]),
        (1, false) => Rgb([255, 0, 0]),
        (1, true) => Rgb([255, 200, 200]),
        (_, false) => Rgb([255, 0, 255]),
        (_, true) => Rgb([255, 200, 255]),
    }
}

pub fn crosshair_color(eye_index: usize) -> Rgb<u8> {
    if eye_index == 0 {
        Rgb([125, 255, 125])
    } else {
        Rgb([255, 125, 125])
    }
}

pub fn marker_radius(width: u32, height: u32) -> i32 {
    (0.05 * width.max(height) as f64).max(10.0) as i32
}

/// The line part of a crosshair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossKind {
    Hidden,
    Dot,
    /// Three pixels wide.
    Short,
    /// Arms of the given length on every side.
    Long(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crosshair {
    pub cross: CrossKind,
    pub circle_radius: Option<i32>,
}

const DOT_CIRCLES: [f64; 5] = [0.05, 0.1, 0.15, 0.2, 0.25];
const LONG_CIRCLES: [f64; 7] = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35];

/// What crosshair style `style` draws for a crop of side `eye_size`.
pub fn crosshair(style: u8, eye_size: u32) -> Crosshair {
    let e = eye_size as f64;
    let long = CrossKind::Long((e / 3.0) as i32);
    let circle = |f: f64| Some((e * f) as i32);

    let (cross, circle_radius) = match style {
        0 => (CrossKind::Short, None),
        1 => (CrossKind::Dot, None),
        2 => (long, None),
        3..=7 => (CrossKind::Dot, circle(DOT_CIRCLES[style as usize - 3])),
        8..=14 => (long, circle(LONG_CIRCLES[style as usize - 8])),
        _ => (CrossKind::Hidden, None),
    };
    Crosshair { cross, circle_radius }
}

fn put_pixel_checked(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_crosshair(image: &mut RgbImage, center: Point, style: Crosshair, color: Rgb<u8>) {
    let (x, y) = (center.x, center.y);
    match style.cross {
        CrossKind::Hidden => {}
        CrossKind::Dot => put_pixel_checked(image, x, y, color),
        CrossKind::Short => draw_cross_mut(image, color, x, y),
        CrossKind::Long(arm) => {
            let (fx, fy, fa) = (x as f32, y as f32, arm as f32);
            draw_line_segment_mut(image, (fx - fa, fy), (fx + fa, fy), color);
            draw_line_segment_mut(image, (fx, fy - fa), (fx, fy + fa), color);
        }
    }
    if let Some(radius) = style.circle_radius {
        draw_hollow_circle_mut(image, (x, y), radius, color);
    }
}

/// Copy `crop` out of `image`, padding with black where it leaves the image.
pub fn crop_padded(image: &RgbImage, crop: Rect) -> RgbImage {
    let mut out = RgbImage::new(crop.width.max(0) as u32, crop.height.max(0) as u32);
    if let Some(visible) = crop.clamp_to(image.width(), image.height()) {
        let part = image::imageops::crop_imm(
            image,
            visible.x as u32,
            visible.y as u32,
            visible.width as u32,
            visible.height as u32,
        )
        .to_image();
        image::imageops::replace(
            &mut out,
            &part,
            (visible.x - crop.x) as i64,
            (visible.y - crop.y) as i64,
        );
    }
    out
}

/// Working image with every eye marker of a coarse session.
pub fn coarse_frame(working: &RgbImage, session: &CoarseSession) -> RgbImage {
    let mut frame = working.clone();
    let radius = marker_radius(frame.width(), frame.height());

    for (index, p) in session.eyes().points().iter().enumerate() {
        let color = marker_color(index, session.selected() == Some(index));
        draw_hollow_circle_mut(&mut frame, (p.x, p.y), radius, color);
        draw_hollow_circle_mut(&mut frame, (p.x, p.y), radius - 1, color);
        draw_cross_mut(&mut frame, color, p.x, p.y);
    }
    frame
}

/// Zoomed view of the fine session's crop with its crosshair.
pub fn fine_frame(native: &RgbImage, session: &FineSession<'_>) -> RgbImage {
    let settings = session.settings();
    let crop = session.crop();
    let mut view = crop_padded(native, crop);

    let p = session.point();
    let local = Point::new(p.x - crop.x, p.y - crop.y);
    draw_crosshair(
        &mut view,
        local,
        crosshair(settings.crosshair_style, settings.eye_size),
        crosshair_color(session.eye_index()),
    );

    image::imageops::resize(&view, settings.zoom_size, settings.zoom_size, FilterType::Triangle)
}

fn draw_thick_rect(image: &mut RgbImage, r: Rect, color: Rgb<u8>) {
    for inset in 0..2 {
        let w = r.width - 2 * inset;
        let h = r.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = imageproc::rect::Rect::at(r.x + inset, r.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Working image with every face, the chosen face and the eye candidates outlined.
pub fn detection_debug_frame(working: &RgbImage, search: &EyeSearch) -> RgbImage {
    let mut frame = working.clone();
    for face in &search.faces {
        draw_thick_rect(&mut frame, *face, FACE_COLOR);
    }
    if let Some(face) = search.chosen_face {
        draw_thick_rect(&mut frame, face, CHOSEN_FACE_COLOR);
    }
    for eye in &search.eyes {
        draw_thick_rect(&mut frame, *eye, EYE_COLOR);
    }
    frame
}

/// White three pixel crosses at both eye positions.
pub fn mark_eye_positions(image: &mut RgbImage, left: Point, right: Point) {
    for p in [left, right] {
        draw_cross_mut(image, WHITE, p.x, p.y);
    }
}

/// Write `text` in white at the bottom left corner.
pub fn draw_caption(image: &mut RgbImage, text: &str, font: &FontVec, size: f32) {
    let scale = PxScale::from(size);
    let (_, text_height) = text_size(scale, font, text);
    let y = image.height() as i32 - (TEXT_MARGIN + text_height as i32);
    draw_text_mut(image, WHITE, TEXT_MARGIN, y, scale, font, text);
}
