use crate::config::{checked_dir, Config};
use anyhow::{Context, Result};
use eyeline_core::alignment::AlignTarget;
use eyeline_core::correction::Key;
use eyeline_core::schedule::{schedule, verify_sources, RenderMode};
use eyeline_core::PhotoRecord;
use eyeline_media::{load_font, render_job, save_jpeg, show_until_key, Caption, RenderSettings};
use eyeline_store::PhotoStore;

fn caption(config: &Config) -> Result<Option<Caption>> {
    let Some(path) = config.font_path.as_deref() else {
        return Ok(None);
    };
    Ok(Some(Caption {
        font: load_font(path)?,
        size: config.font_size,
        format: config.date_format.clone(),
        locale: config.locale()?,
    }))
}

/// Render the stored photos into aligned frames in the target directory.
pub fn run(config: &Config, mode: RenderMode, show: bool) -> Result<()> {
    let Some(photo_dir) = checked_dir(config.photo_dir.as_deref(), "photo_dir") else {
        return Ok(());
    };
    let Some(target_dir) = checked_dir(config.target_dir.as_deref(), "target_dir") else {
        return Ok(());
    };
    if photo_dir == target_dir {
        tracing::error!(dir = %photo_dir.display(), "target_dir must differ from photo_dir");
        return Ok(());
    }
    if !config.db_path.is_file() {
        tracing::error!(path = %config.db_path.display(), "no store found, run add first");
        return Ok(());
    }

    if let Some(font) = config.font_path.as_deref().filter(|p| !p.is_file()) {
        tracing::error!(path = %font.display(), "font file not found");
        return Ok(());
    }
    let caption = caption(config)?;
    let target = AlignTarget::new(config.offset_pct, config.dest_size);
    target.validate().context("invalid offset_pct or dest_size")?;
    let settings = RenderSettings {
        target,
        caption,
        pos_debug: config.pos_debug,
    };

    let store = PhotoStore::open(&config.db_path)?;
    let records = store.all_ordered()?;
    if records.is_empty() {
        tracing::warn!("store is empty, nothing to render");
        return Ok(());
    }

    let complete: Vec<PhotoRecord> = records.iter().filter(|r| r.is_complete()).cloned().collect();
    verify_sources(&complete, &photo_dir)?;

    let jobs = schedule(&records, mode);
    tracing::info!(frames = jobs.len(), %mode, "rendering");

    for job in &jobs {
        tracing::info!(
            file = %job.record.filename,
            date = %job.display_date,
            brightness = job.brightness,
            "rendering frame"
        );
        let frame = render_job(&photo_dir, job, &settings)
            .with_context(|| format!("rendering {}", job.record.filename))?;

        if show {
            let title = format!("{} {}", job.record.filename, job.display_date);
            if show_until_key(&title, &frame)? == Key::Char('q') {
                tracing::info!("cancelled by operator");
                return Ok(());
            }
        }

        save_jpeg(&frame, &target_dir.join(job.output_file_name()))?;
    }

    tracing::info!(frames = jobs.len(), dir = %target_dir.display(), "render done");
    Ok(())
}
