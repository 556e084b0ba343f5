use crate::config::{checked_dir, Config};
use anyhow::Result;
use eyeline_store::{is_confirmed, tidy, PhotoStore, CONFIRM_WORD};
use std::io::{self, BufRead, Write};

/// List the orphans and read the operator's answer.
pub fn ask_confirmation(orphans: &[String], input: &mut impl BufRead, out: &mut impl Write) -> io::Result<bool> {
    writeln!(out, "These photos are in the store but no longer in the photo directory:")?;
    for name in orphans {
        writeln!(out, "  {name}")?;
    }
    write!(out, "Do you want to remove these photos from the store? [{CONFIRM_WORD}/no]: ")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(is_confirmed(&answer))
}

pub fn run(config: &Config) -> Result<()> {
    let Some(photo_dir) = checked_dir(config.photo_dir.as_deref(), "photo_dir") else {
        return Ok(());
    };
    if !config.db_path.is_file() {
        tracing::error!(path = %config.db_path.display(), "no store found");
        return Ok(());
    }

    let mut store = PhotoStore::open(&config.db_path)?;
    if store.count()? == 0 {
        tracing::error!(path = %config.db_path.display(), "store is empty, nothing to tidy");
        return Ok(());
    }

    let report = tidy(&mut store, &photo_dir, |orphans| {
        ask_confirmation(orphans, &mut io::stdin().lock(), &mut io::stdout())
    })?;

    if report.orphans.is_empty() {
        println!("Store and photo directory agree ({} records).", report.before);
    } else if report.confirmed {
        println!("Removed {} of {} records.", report.deleted, report.before);
    } else {
        println!("Nothing removed.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_orphans_and_reads_answer() {
        let orphans = vec!["b.jpg".to_string(), "c.jpg".to_string()];
        let mut out = Vec::new();
        let confirmed = ask_confirmation(&orphans, &mut "delete\n".as_bytes(), &mut out).unwrap();
        assert!(confirmed);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  b.jpg\n"));
        assert!(text.contains("  c.jpg\n"));
        assert!(text.ends_with("[delete/no]: "));
    }

    #[test]
    fn test_anything_else_declines() {
        let orphans = vec!["b.jpg".to_string()];
        for answer in ["no\n", "yes\n", "DELETE\n", ""] {
            let confirmed = ask_confirmation(&orphans, &mut answer.as_bytes(), &mut io::sink()).unwrap();
            assert!(!confirmed, "{answer:?}");
        }
    }
}
