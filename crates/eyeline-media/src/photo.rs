//! Photos on disk: listing, oriented decoding, capture time and import.

use crate::{MediaError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const IMPORT_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Whether `name` matches one of the photo patterns `*.jpg`, `*.JPG`, `*.jpeg`.
pub fn is_photo_name(name: &str) -> bool {
    [".jpg", ".JPG", ".jpeg"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// File names of all photos in `dir`, sorted.
pub fn list_photos(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(MediaError::InvalidDirectory(dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_photo_name(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    tracing::debug!(dir = %dir.display(), count = names.len(), "listed photos");
    Ok(names)
}

/// Decode a photo with its embedded orientation applied.
pub fn load_oriented(path: &Path) -> Result<RgbImage> {
    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    tracing::trace!(path = %path.display(), ?orientation, "photo decoded");
    Ok(image.into_rgb8())
}

/// `DateTimeOriginal` from the EXIF block, if the photo carries one.
pub fn exif_capture_time(path: &Path) -> Result<Option<NaiveDateTime>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(MediaError::Exif(e)),
    };

    let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) else {
        return Ok(None);
    };
    let exif::Value::Ascii(ref values) = field.value else {
        return Ok(None);
    };
    let Some(raw) = values.first() else {
        return Ok(None);
    };

    let text = String::from_utf8_lossy(raw);
    match NaiveDateTime::parse_from_str(text.trim_end_matches('\0').trim(), EXIF_DATETIME_FORMAT) {
        Ok(at) => Ok(Some(at)),
        Err(e) => {
            tracing::warn!(path = %path.display(), value = %text, error = %e, "unreadable DateTimeOriginal");
            Ok(None)
        }
    }
}

/// Parse a timestamp from the whole file name with a chrono pattern.
///
/// Patterns without a time part yield midnight.
pub fn filename_capture_time(file_name: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(file_name, pattern)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(file_name, pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn modified_time(path: &Path) -> Result<NaiveDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}

/// When the photo was taken: EXIF first, then the file name pattern, then mtime.
pub fn capture_timestamp(path: &Path, filename_pattern: Option<&str>) -> Result<NaiveDateTime> {
    match exif_capture_time(path) {
        Ok(Some(at)) => return Ok(at),
        Ok(None) => {}
        Err(MediaError::Exif(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable exif data");
        }
        Err(e) => return Err(e),
    }

    if let Some(pattern) = filename_pattern.filter(|p| !p.is_empty()) {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        match filename_capture_time(name, pattern) {
            Some(at) => return Ok(at),
            None => tracing::warn!(file = name, pattern, "file name does not match timestamp pattern"),
        }
    }

    modified_time(path)
}

/// Options for copying freshly dropped photos into the photo directory.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub prefix: Option<String>,
    /// Remove each source after it was copied.
    pub delete: bool,
    pub filename_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub copied: Vec<PathBuf>,
    /// Destinations that already existed.
    pub skipped: Vec<PathBuf>,
    pub deleted: usize,
}

/// Destination file name for a photo captured at `at`.
pub fn import_name(at: NaiveDateTime, prefix: Option<&str>, extension: &str) -> String {
    let stamp = at.format(IMPORT_NAME_FORMAT);
    let ext = if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    };
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}_{stamp}{ext}"),
        None => format!("{stamp}{ext}"),
    }
}

/// Copy every photo in `drop_dir` into `photo_dir`, renamed after its capture time.
pub fn import_photos(drop_dir: &Path, photo_dir: &Path, options: &ImportOptions) -> Result<ImportReport> {
    if !photo_dir.is_dir() {
        return Err(MediaError::InvalidDirectory(photo_dir.to_path_buf()));
    }
    let photos = list_photos(drop_dir)?;
    let mut report = ImportReport::default();

    if photos.is_empty() {
        tracing::info!(dir = %drop_dir.display(), "no photos to import");
        return Ok(report);
    }
    tracing::info!(
        count = photos.len(),
        from = %drop_dir.display(),
        to = %photo_dir.display(),
        "importing photos"
    );

    for name in &photos {
        let source = drop_dir.join(name);
        let at = capture_timestamp(&source, options.filename_pattern.as_deref())?;
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let dest = photo_dir.join(import_name(at, options.prefix.as_deref(), extension));

        if dest.exists() {
            tracing::warn!(dest = %dest.display(), "destination already exists, not copying");
            report.skipped.push(dest);
            continue;
        }

        tracing::info!(from = %source.display(), to = %dest.display(), "copying");
        fs::copy(&source, &dest)?;
        let modified = fs::metadata(&source)?.modified()?;
        File::options().write(true).open(&dest)?.set_modified(modified)?;
        report.copied.push(dest);

        if options.delete {
            tracing::info!(path = %source.display(), "deleting source");
            fs::remove_file(&source)?;
            report.deleted += 1;
        }
    }

    tracing::info!(copied = report.copied.len(), skipped = report.skipped.len(), "import done");
    Ok(report)
}
