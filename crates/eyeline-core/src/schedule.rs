//! Timelapse frame scheduling.
//!
//! Turns stored records into an ordered list of [`RenderJob`]s. In fill mode
//! every calendar day between the first and last photo gets a frame; days
//! without a photo reuse the last real one with a fading brightness.

use crate::types::PhotoRecord;
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Brightness multiplier applied once per consecutive day without a photo.
pub const FILL_DECAY: f64 = 0.90;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("photo {filename} is missing from {dir}; check the path or run tidy")]
    MissingPhoto { filename: String, dir: PathBuf },
    #[error("unknown render mode '{0}' (expected 'all' or 'fill')")]
    UnknownMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// One frame per stored photo.
    All,
    /// One frame per calendar day.
    #[default]
    Fill,
}

impl FromStr for RenderMode {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "fill" => Ok(Self::Fill),
            _ => Err(ScheduleError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Fill => "fill",
        })
    }
}

/// One frame to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub record: PhotoRecord,
    /// Date written onto the frame; differs from the capture date on filled days.
    pub display_date: NaiveDate,
    pub brightness: f64,
}

impl RenderJob {
    pub fn output_file_name(&self) -> String {
        format!("rendered_{}.jpg", self.display_date.format("%Y_%m_%d"))
    }

    pub fn is_filler(&self) -> bool {
        self.display_date != self.record.capture_date()
    }
}

/// Fail if any record points at a file that is not in `photo_dir`.
pub fn verify_sources(records: &[PhotoRecord], photo_dir: &Path) -> Result<(), ScheduleError> {
    match records.iter().find(|r| !photo_dir.join(&r.filename).is_file()) {
        Some(missing) => Err(ScheduleError::MissingPhoto {
            filename: missing.filename.clone(),
            dir: photo_dir.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Order complete records by capture time and lay out the frames for `mode`.
pub fn schedule(records: &[PhotoRecord], mode: RenderMode) -> Vec<RenderJob> {
    let mut complete: Vec<&PhotoRecord> = records.iter().filter(|r| r.is_complete()).collect();
    complete.sort_by_key(|r| r.captured_at);

    let skipped = records.len() - complete.len();
    if skipped > 0 {
        tracing::warn!(skipped, "records without eye positions are not rendered");
    }

    match mode {
        RenderMode::All => complete
            .into_iter()
            .map(|r| RenderJob {
                record: r.clone(),
                display_date: r.capture_date(),
                brightness: 1.0,
            })
            .collect(),
        RenderMode::Fill => fill(&complete),
    }
}

fn fill(records: &[&PhotoRecord]) -> Vec<RenderJob> {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Vec::new();
    };
    let (first_day, last_day) = (first.capture_date(), last.capture_date());
    tracing::info!(%first_day, %last_day, "filling every day between first and last photo");

    let mut jobs = Vec::new();
    let mut pending = records.iter().peekable();
    let mut current: Option<&PhotoRecord> = None;
    let mut brightness = 1.0;

    for day in first_day.iter_days().take_while(|d| *d <= last_day) {
        let mut real = None;
        while let Some(r) = pending.next_if(|r| r.capture_date() <= day) {
            // first photo of the day wins
            if r.capture_date() == day && real.is_none() {
                real = Some(*r);
            }
        }

        match real {
            Some(r) => {
                current = Some(r);
                brightness = 1.0;
            }
            None => {
                tracing::debug!(%day, "no photo for this day");
                brightness *= FILL_DECAY;
            }
        }

        if let Some(r) = current {
            jobs.push(RenderJob {
                record: r.clone(),
                display_date: day,
                brightness,
            });
        }
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use chrono::NaiveDateTime;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(name: &str, day: u32, hour: u32) -> PhotoRecord {
        PhotoRecord {
            filename: name.to_string(),
            captured_at: at(day, hour),
            left_eye: Some(Point::new(10, 20)),
            right_eye: Some(Point::new(30, 20)),
        }
    }

    fn brightness(jobs: &[RenderJob]) -> Vec<f64> {
        jobs.iter().map(|j| j.brightness).collect()
    }

    #[test]
    fn test_fill_decays_over_gap() {
        let records = vec![record("d4.jpg", 4, 9), record("d1.jpg", 1, 9)];
        let jobs = schedule(&records, RenderMode::Fill);

        assert_eq!(jobs.len(), 4);
        let expected = [1.0, 0.9, 0.81, 1.0];
        for (got, want) in brightness(&jobs).iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }

        let days: Vec<u32> = jobs.iter().map(|j| chrono::Datelike::day(&j.display_date)).collect();
        assert_eq!(days, vec![1, 2, 3, 4]);
        assert_eq!(jobs[1].record.filename, "d1.jpg");
        assert_eq!(jobs[2].record.filename, "d1.jpg");
        assert!(jobs[2].is_filler());
        assert_eq!(jobs[3].record.filename, "d4.jpg");
        assert_eq!(jobs[2].output_file_name(), "rendered_2014_03_03.jpg");
    }

    #[test]
    fn test_fill_decay_has_no_floor() {
        let records = vec![record("a.jpg", 1, 9), record("b.jpg", 31, 9)];
        let jobs = schedule(&records, RenderMode::Fill);
        assert_eq!(jobs.len(), 31);
        let deepest = jobs[29].brightness;
        assert!((deepest - FILL_DECAY.powi(29)).abs() < 1e-12);
        assert!(deepest < 0.05);
    }

    #[test]
    fn test_fill_takes_first_photo_of_a_day() {
        let records = vec![record("late.jpg", 2, 18), record("early.jpg", 2, 7), record("a.jpg", 1, 9)];
        let jobs = schedule(&records, RenderMode::Fill);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].record.filename, "early.jpg");
        assert_eq!(brightness(&jobs), vec![1.0, 1.0]);
    }

    #[test]
    fn test_all_mode_one_job_per_record() {
        let records = vec![record("b.jpg", 5, 9), record("a.jpg", 1, 9), record("c.jpg", 5, 20)];
        let jobs = schedule(&records, RenderMode::All);
        let names: Vec<&str> = jobs.iter().map(|j| j.record.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert!(jobs.iter().all(|j| j.brightness == 1.0 && !j.is_filler()));
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let pending = PhotoRecord::pending("p.jpg", at(2, 9));
        let records = vec![record("a.jpg", 1, 9), pending, record("c.jpg", 3, 9)];
        let jobs = schedule(&records, RenderMode::Fill);
        let names: Vec<&str> = jobs.iter().map(|j| j.record.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "a.jpg", "c.jpg"]);
    }

    #[test]
    fn test_empty_store_schedules_nothing() {
        assert!(schedule(&[], RenderMode::Fill).is_empty());
        assert!(schedule(&[], RenderMode::All).is_empty());
    }

    #[test]
    fn test_verify_sources_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();

        let records = vec![record("a.jpg", 1, 9), record("gone.jpg", 2, 9)];
        match verify_sources(&records, dir.path()) {
            Err(ScheduleError::MissingPhoto { filename, .. }) => assert_eq!(filename, "gone.jpg"),
            other => panic!("expected missing photo, got {other:?}"),
        }
        assert!(verify_sources(&records[..1], dir.path()).is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("FILL".parse::<RenderMode>().unwrap(), RenderMode::Fill);
        assert_eq!("all".parse::<RenderMode>().unwrap(), RenderMode::All);
        assert!("weekly".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::default().to_string(), "fill");
    }
}
