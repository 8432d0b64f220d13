//! `cdr-admin audio`: delivery checks and fetches from the transfer drop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;

use cdr::audio::{check_archive, list_directory, select_archives, ArchiveReport};
use cdr::config::Config;
use cdr::services::{FileTransfer, LocalTransfer};

use super::emit;

#[derive(Debug, Subcommand)]
pub enum AudioCommand {
    /// Check one archive, or every conforming archive in a directory
    Check {
        /// Archive or directory (defaults to the configured audio directory)
        path: Option<PathBuf>,
    },

    /// Copy new archives from a mirrored transfer drop, then check them
    Fetch {
        /// Root of the mirrored drop
        #[arg(long = "drop")]
        drop_dir: PathBuf,
        /// Directory on the drop holding the deliveries
        #[arg(long, default_value = "production")]
        remote_dir: String,
        /// Local destination (defaults to the configured audio directory)
        dest: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Serialize)]
struct CheckSummary {
    reports: Vec<ArchiveReport>,
    skipped: Vec<String>,
}

fn local_path(given: Option<&PathBuf>, config: &Config) -> Result<PathBuf> {
    match given {
        Some(p) => Ok(p.clone()),
        None => match &config.audio.directory {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => bail!("no path given and no audio directory configured"),
        },
    }
}

pub fn run(cmd: &AudioCommand, config: &Config, json: bool) -> Result<()> {
    match cmd {
        AudioCommand::Check { path } => check(&local_path(path.as_ref(), config)?, json),
        AudioCommand::Fetch {
            drop_dir,
            remote_dir,
            dest,
        } => {
            let dest = local_path(dest.as_ref(), config)?;
            fetch(drop_dir, remote_dir, &dest, config)?;
            check(&dest, json)
        }
    }
}

/// Copies conforming archives not yet present locally.
fn fetch(drop_dir: &Path, remote_dir: &str, dest: &Path, config: &Config) -> Result<()> {
    let transfer = LocalTransfer::new(drop_dir, config.timeouts().sftp);
    fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let selection = select_archives(transfer.list(remote_dir)?);
    for name in &selection.accepted {
        let local = dest.join(name);
        if local.exists() {
            continue;
        }
        let bytes = transfer.fetch(&format!("{}/{}", remote_dir, name), &local)?;
        log::info!("Fetched {} ({} bytes)", name, bytes);
    }
    Ok(())
}

fn check(path: &Path, json: bool) -> Result<()> {
    let mut summary = CheckSummary::default();
    if path.is_dir() {
        let selection = select_archives(list_directory(path)?);
        summary.skipped = selection.rejected;
        for name in &selection.accepted {
            let report = check_archive(&path.join(name)).with_context(|| format!("Failed to read {}", name))?;
            summary.reports.push(report);
        }
    } else {
        summary.reports.push(check_archive(path)?);
    }

    emit(&summary, json, |s| {
        for name in &s.skipped {
            println!("{}: skipped, name does not match Week_YYYY_WW[_RevN].zip", name);
        }
        for report in &s.reports {
            if report.is_ok() {
                println!("{}: OK ({} MP3 files)", report.archive, report.mp3_paths.len());
            } else {
                println!("{}: {} problems", report.archive, report.problems.len());
                for problem in &report.problems {
                    println!("  {}", problem);
                }
            }
        }
    })?;

    let failing = summary.reports.iter().filter(|r| !r.is_ok()).count();
    if failing > 0 {
        bail!("{} of {} archives failed the check", failing, summary.reports.len());
    }
    Ok(())
}
