//! Turning a scheduled job into a finished frame on disk.

use crate::frame::scale_brightness;
use crate::overlay::{draw_caption, mark_eye_positions};
use crate::photo::load_oriented;
use crate::{MediaError, Result};
use ab_glyph::FontVec;
use chrono::{Locale, NaiveDateTime, TimeZone, Utc};
use eyeline_core::alignment::{align_eyes, AlignTarget};
use eyeline_core::schedule::RenderJob;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub const JPEG_QUALITY: u8 = 95;

/// Date caption drawn onto every frame.
pub struct Caption {
    pub font: FontVec,
    pub size: f32,
    pub format: String,
    pub locale: Locale,
}

pub struct RenderSettings {
    pub target: AlignTarget,
    pub caption: Option<Caption>,
    /// Mark the stored eye positions before aligning.
    pub pos_debug: bool,
}

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)?;
    FontVec::try_from_vec(bytes).map_err(|e| MediaError::Font {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Format `at` with a strftime pattern in the given locale.
pub fn format_date(at: NaiveDateTime, format: &str, locale: Locale) -> Result<String> {
    let mut text = String::new();
    write!(text, "{}", Utc.from_utc_datetime(&at).format_localized(format, locale))
        .map_err(|_| MediaError::DateFormat(format.to_string()))?;
    Ok(text)
}

/// The moment a frame is captioned with: the photo's own time, or midnight of a filler day.
fn caption_time(job: &RenderJob) -> NaiveDateTime {
    if job.is_filler() {
        job.display_date.and_time(chrono::NaiveTime::MIN)
    } else {
        job.record.captured_at
    }
}

/// Load, align, dim and caption the photo of one job.
pub fn render_job(photo_dir: &Path, job: &RenderJob, settings: &RenderSettings) -> Result<RgbImage> {
    let Some((left, right)) = job.record.eyes() else {
        return Err(MediaError::IncompleteRecord(job.record.filename.clone()));
    };

    let mut photo = load_oriented(&photo_dir.join(&job.record.filename))?;
    if settings.pos_debug {
        mark_eye_positions(&mut photo, left, right);
    }

    let mut frame = align_eyes(&photo, left, right, &settings.target)?;
    scale_brightness(&mut frame, job.brightness);

    if let Some(caption) = &settings.caption {
        let text = format_date(caption_time(job), &caption.format, caption.locale)?;
        draw_caption(&mut frame, &text, &caption.font, caption.size);
    }
    Ok(frame)
}

pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(image)?;
    tracing::debug!(path = %path.display(), "frame written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use eyeline_core::{PhotoRecord, Point};
    use image::Rgb;

    fn job(brightness: f64, display_day: u32) -> RenderJob {
        let at = NaiveDate::from_ymd_opt(2014, 6, 1).unwrap().and_hms_opt(9, 15, 0).unwrap();
        RenderJob {
            record: PhotoRecord {
                filename: "p.jpg".into(),
                captured_at: at,
                left_eye: Some(Point::new(40, 50)),
                right_eye: Some(Point::new(80, 50)),
            },
            display_date: NaiveDate::from_ymd_opt(2014, 6, display_day).unwrap(),
            brightness,
        }
    }

    fn settings() -> RenderSettings {
        RenderSettings {
            target: AlignTarget::new((0.3, 0.4), (60, 40)),
            caption: None,
            pos_debug: false,
        }
    }

    #[test]
    fn test_format_date_localized() {
        let at = NaiveDate::from_ymd_opt(2014, 3, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(format_date(at, "%d.%m.%Y", Locale::de_DE).unwrap(), "02.03.2014");
        assert_eq!(format_date(at, "%B", Locale::de_DE).unwrap(), "März");
        assert_eq!(format_date(at, "%B", Locale::en_US).unwrap(), "March");
    }

    #[test]
    fn test_caption_time_for_filler() {
        assert_eq!(caption_time(&job(1.0, 1)).format("%H:%M").to_string(), "09:15");
        let filler = caption_time(&job(0.9, 3));
        assert_eq!(filler.date(), NaiveDate::from_ymd_opt(2014, 6, 3).unwrap());
        assert_eq!(filler.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn test_render_job_dims_aligned_frame() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(120, 100, Rgb([200, 200, 200]))
            .save_with_format(dir.path().join("p.jpg"), image::ImageFormat::Jpeg)
            .unwrap();

        let bright = render_job(dir.path(), &job(1.0, 1), &settings()).unwrap();
        let dim = render_job(dir.path(), &job(0.5, 2), &settings()).unwrap();
        assert_eq!(bright.dimensions(), (60, 40));

        let b = bright.get_pixel(30, 20).0[0] as i32;
        let d = dim.get_pixel(30, 20).0[0] as i32;
        assert!((d - b / 2).abs() <= 1, "bright {b} dim {d}");
    }

    #[test]
    fn test_missing_photo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(render_job(dir.path(), &job(1.0, 1), &settings()).is_err());
    }

    #[test]
    fn test_incomplete_record_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut j = job(1.0, 1);
        j.record.right_eye = None;
        assert!(matches!(
            render_job(dir.path(), &j, &settings()),
            Err(MediaError::IncompleteRecord(_))
        ));
    }

    #[test]
    fn test_save_jpeg_roundtrips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(job(1.0, 1).output_file_name());
        save_jpeg(&RgbImage::new(32, 16), &path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (32, 16));
    }

    #[test]
    fn test_bad_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(MediaError::Font { .. })));
    }
}
