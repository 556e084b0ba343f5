//! Working copies of a photo: downscaling, grayscale and brightness.

use eyeline_core::{ImageSize, ScaleMap};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

/// A native photo together with the downscaled copy shown and searched.
#[derive(Clone)]
pub struct WorkingImage {
    pub native: RgbImage,
    pub working: RgbImage,
    pub scale: ScaleMap,
}

impl WorkingImage {
    /// Downscale `native` so its longest side is at most `max_dimension`.
    pub fn new(native: RgbImage, max_dimension: u32) -> Self {
        let scale = ScaleMap::new(native_size(&native), max_dimension);
        let ws = scale.working_size();
        let working = if scale.is_identity() {
            native.clone()
        } else {
            image::imageops::resize(&native, ws.width, ws.height, FilterType::Triangle)
        };
        tracing::debug!(scale = scale.scale(), width = ws.width, height = ws.height, "working image");

        Self { native, working, scale }
    }

    pub fn native_size(&self) -> ImageSize {
        self.scale.native_size()
    }

    pub fn working_size(&self) -> ImageSize {
        self.scale.working_size()
    }

    /// Grayscale version of the working image for detection.
    pub fn detection_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.working)
    }
}

pub fn native_size(image: &RgbImage) -> ImageSize {
    ImageSize::new(image.width(), image.height())
}

/// Multiply every channel by `factor`, truncating like an 8-bit lookup table.
pub fn scale_brightness(image: &mut RgbImage, factor: f64) {
    if factor == 1.0 {
        return;
    }
    let lut: Vec<u8> = (0..=255u32)
        .map(|v| (v as f64 * factor).clamp(0.0, 255.0) as u8)
        .collect();
    for value in image.iter_mut() {
        *value = lut[*value as usize];
    }
}

/// Pack RGB pixels as `0RGB` words for a framebuffer.
pub fn to_framebuffer(image: &RgbImage, buffer: &mut Vec<u32>) {
    buffer.clear();
    buffer.extend(
        image
            .pixels()
            .map(|p| ((p.0[0] as u32) << 16) | ((p.0[1] as u32) << 8) | p.0[2] as u32),
    );
}
