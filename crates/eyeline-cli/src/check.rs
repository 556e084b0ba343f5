use crate::config::{checked_dir, Config};
use crate::interactive::{pair, Corrector};
use anyhow::{Context, Result};
use eyeline_core::{Outcome, Point};
use eyeline_media::photo::{list_photos, load_oriented};
use eyeline_media::WorkingImage;
use eyeline_store::PhotoStore;

/// Photos from `begin_with` on, or all of them.
pub fn starting_at<'a>(photos: &'a [String], begin_with: Option<&str>) -> Option<&'a [String]> {
    match begin_with {
        Some(name) => photos.iter().position(|p| p == name).map(|i| &photos[i..]),
        None => Some(photos),
    }
}

/// Walk stored photos again and let the operator correct their eye positions.
pub fn run(config: &Config, begin_with: Option<&str>, coarse: bool) -> Result<()> {
    let Some(photo_dir) = checked_dir(config.photo_dir.as_deref(), "photo_dir") else {
        return Ok(());
    };
    if !config.db_path.is_file() {
        tracing::error!(path = %config.db_path.display(), "no store found, run add first");
        return Ok(());
    }

    let photos = list_photos(&photo_dir)?;
    let Some(photos) = starting_at(&photos, begin_with) else {
        tracing::error!(file = begin_with.unwrap_or_default(), "photo to begin with is not in the photo directory");
        return Ok(());
    };

    let mut store = PhotoStore::open(&config.db_path)?;
    let mut corrector = Corrector::new(config.zoom_size);

    check_photos(&mut store, photos, |name, stored| {
        let image = WorkingImage::new(load_oriented(&photo_dir.join(name))?, config.max_size);
        let (mut left, mut right) = stored;

        if coarse {
            let seeds = vec![image.scale.to_working(left), image.scale.to_working(right)];
            match corrector.coarse(name, &image, seeds.clone())? {
                Outcome::Committed(points) if points != seeds => {
                    let (l, r) = pair(&points).context("coarse correction ended without two eyes")?;
                    (left, right) = (image.scale.to_native(l), image.scale.to_native(r));
                }
                Outcome::Committed(_) => {}
                Outcome::Cancelled => return Ok(Outcome::Cancelled),
            }
        }

        corrector.fine(name, &image, (left, right))
    })
}

/// Re-correct the stored eyes of `photos` in order.
///
/// `correct` receives the stored native pair and returns the new one.
/// Photos without a record or without eyes are skipped; duplicate rows end
/// the run with an error.
pub fn check_photos<F>(store: &mut PhotoStore, photos: &[String], mut correct: F) -> Result<()>
where
    F: FnMut(&str, (Point, Point)) -> Result<Outcome<(Point, Point)>>,
{
    for name in photos {
        let Some(mut record) = store.fetch_unique(name)? else {
            tracing::error!(file = %name, "photo is not in the store, run add first");
            continue;
        };
        let Some(stored) = record.eyes() else {
            tracing::warn!(file = %name, "no eye positions stored yet, run add first");
            continue;
        };

        tracing::info!(file = %name, left = ?stored.0, right = ?stored.1, "checking");
        let (l, r) = match correct(name, stored)? {
            Outcome::Committed(eyes) => eyes,
            Outcome::Cancelled => {
                tracing::info!("cancelled by operator");
                return Ok(());
            }
        };
        record.left_eye = Some(l);
        record.right_eye = Some(r);
        store.upsert(&record)?;
        tracing::info!(file = %name, left = ?l, right = ?r, "eye positions updated");
    }
    Ok(())
}
