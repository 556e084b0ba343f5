use crate::config::{checked_dir, Config};
use anyhow::Result;
use eyeline_media::photo::{import_photos, ImportOptions};

pub fn run(config: &Config) -> Result<()> {
    let Some(drop_dir) = checked_dir(config.drop_dir.as_deref(), "drop_dir") else {
        return Ok(());
    };
    let photo_dir = match config.photo_dir.as_deref() {
        Some(dir) => match checked_dir(Some(dir), "photo_dir") {
            Some(dir) => dir,
            None => return Ok(()),
        },
        None => {
            tracing::warn!(dir = %drop_dir.display(), "no photo_dir configured, renaming in place");
            drop_dir.clone()
        }
    };

    let options = ImportOptions {
        prefix: config.prefix.clone(),
        delete: config.delete,
        filename_pattern: config.date_format_in_filename.clone(),
    };
    let report = import_photos(&drop_dir, &photo_dir, &options)?;

    for path in &report.copied {
        println!("{}", path.display());
    }
    if !report.skipped.is_empty() {
        println!("{} photos skipped, their destination already exists", report.skipped.len());
    }
    Ok(())
}
