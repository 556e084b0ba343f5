use crate::config::{checked_dir, Config};
use crate::interactive::{pair, Corrector};
use anyhow::{Context, Result};
use eyeline_core::detector::CascadePaths;
use eyeline_core::{Outcome, PhotoRecord, Point};
use eyeline_media::photo::{capture_timestamp, list_photos, load_oriented};
use eyeline_media::WorkingImage;
use eyeline_store::{check_source_count, PhotoStore, StoreError};
use std::path::Path;

/// Detect and correct eyes for every photo that has no complete record yet.
pub fn run(config: &Config) -> Result<()> {
    let Some(photo_dir) = checked_dir(config.photo_dir.as_deref(), "photo_dir") else {
        return Ok(());
    };
    let photos = list_photos(&photo_dir)?;
    if photos.is_empty() {
        tracing::warn!(dir = %photo_dir.display(), "no photos found");
        return Ok(());
    }

    let mut store = PhotoStore::open(&config.db_path)
        .with_context(|| format!("opening store {}", config.db_path.display()))?;
    match check_source_count(&store, photos.len()) {
        Ok(()) => {}
        Err(StoreError::SourceShrunk { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let paths = CascadePaths::resolve(
        &config.model_dir,
        &config.face_model,
        &config.eyeglasses_model,
        &config.eye_model,
    )?;
    let mut corrector = Corrector::new(config.zoom_size).with_detector(paths, config.detection_debug)?;

    let added = add_photos(
        &mut store,
        &photo_dir,
        &photos,
        config.date_format_in_filename.as_deref(),
        |path, name| locate(&mut corrector, path, name, config.max_size),
    )?;
    tracing::info!(added, "photos added");
    Ok(())
}

/// Store eye positions for every photo without a complete record.
///
/// `locate` supplies the native eye pair of one photo. Returns how many
/// photos were stored before the run finished or was cancelled. Duplicate
/// rows for a photo end the run with an error.
pub fn add_photos<F>(
    store: &mut PhotoStore,
    photo_dir: &Path,
    photos: &[String],
    filename_pattern: Option<&str>,
    mut locate: F,
) -> Result<usize>
where
    F: FnMut(&Path, &str) -> Result<Outcome<(Point, Point)>>,
{
    let mut added = 0usize;
    for name in photos {
        let path = photo_dir.join(name);
        let mut record = match store.fetch_unique(name)? {
            Some(record) if record.is_complete() => {
                tracing::debug!(file = %name, "already stored");
                continue;
            }
            Some(record) => record,
            None => PhotoRecord::pending(name.as_str(), capture_timestamp(&path, filename_pattern)?),
        };

        tracing::info!(file = %name, captured_at = %record.captured_at, "locating eyes");
        let (left, right) = match locate(&path, name)? {
            Outcome::Committed(eyes) => eyes,
            Outcome::Cancelled => {
                tracing::info!(added, "cancelled by operator");
                return Ok(added);
            }
        };

        record.left_eye = Some(left);
        record.right_eye = Some(right);
        store.upsert(&record)?;
        added += 1;
        tracing::info!(file = %name, ?left, ?right, "eye positions stored");
    }
    Ok(added)
}

/// Detection, coarse and fine correction of one photo, in native coordinates.
fn locate(corrector: &mut Corrector, path: &Path, name: &str, max_size: u32) -> Result<Outcome<(Point, Point)>> {
    let image = WorkingImage::new(load_oriented(path)?, max_size);
    let seeds = corrector.detect(name, &image)?;

    let points = match corrector.coarse(name, &image, seeds)? {
        Outcome::Committed(points) => points,
        Outcome::Cancelled => return Ok(Outcome::Cancelled),
    };
    let (left, right) = pair(&points).context("coarse correction ended without two eyes")?;
    let native = (image.scale.to_native(left), image.scale.to_native(right));

    corrector.fine(name, &image, native)
}
