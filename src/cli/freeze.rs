use std::{env, process::ExitCode};

use clap::builder::styling::AnsiColor;
use log::{debug, error, info, warn};
use tokio::signal;

use crate::{
    archive::Archiver,
    error::Result,
    format::{format_elapsed, format_key, format_path, format_size},
    freeze::{Freezer, Outcome, Summary},
    lockfile::LockFile,
    manifest::Manifest,
};

use super::{print_stat, storage::create_storage, FreezeArgs};

/// Conventional exit status after SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

pub async fn main(cli: FreezeArgs) -> Result<ExitCode> {
    let manifest_path = &cli.global.manifest;
    let manifest = Manifest::load(manifest_path).await?;
    let lock_file = LockFile::load(LockFile::path_for(manifest_path)).await?;
    debug!(
        "loaded {} entries from {} and {} records from {}",
        manifest.len(),
        format_path(manifest_path),
        lock_file.len(),
        format_path(lock_file.path())
    );

    if manifest.is_empty() {
        warn!("{} declares no entries", format_path(manifest_path));
    }

    let storage = create_storage(&cli).await?;
    let scratch_dir = cli.scratch_dir.clone().unwrap_or_else(env::temp_dir);
    let archiver = Archiver::new(scratch_dir, cli.compression_level);
    let freezer = Freezer::new(storage, archiver)
        .with_jobs(cli.jobs)
        .with_dry_run(cli.dry_run);

    let summary = tokio::select! {
        result = freezer.run(&manifest, lock_file) => result?,
        _ = signal::ctrl_c() => {
            warn!("interrupted; unfinished entries will be retried on the next run");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    print_summary(&summary);

    if cli.stats {
        print_stat("bytes uploaded", format_size(summary.bytes_uploaded()));
        print_stat("elapsed time", format_elapsed(summary.elapsed));
    }

    if summary.aborted {
        error!("run aborted; remaining entries were not attempted");
    }

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(summary: &Summary) {
    for entry in &summary.outcomes {
        let style = match entry.outcome {
            Outcome::Uploaded { .. } => AnsiColor::Blue,
            Outcome::Skipped => AnsiColor::BrightBlack,
            Outcome::Planned => AnsiColor::Yellow,
            Outcome::Failed(_) => AnsiColor::Red,
        }
        .on_default();
        let label = entry.outcome.label();
        info!(
            "{style}{label:>8}{style:#} {} <- {}",
            format_key(&entry.target_key),
            format_path(&entry.source)
        );
    }

    for entry in summary.failures() {
        if let Outcome::Failed(err) = &entry.outcome {
            error!("{} needs attention: {err}", format_key(&entry.target_key));
        }
    }

    info!(
        "{} uploaded, {} skipped, {} failed{}",
        summary.uploaded(),
        summary.skipped(),
        summary.failed(),
        match summary.planned() {
            0 => String::new(),
            planned => format!(", {planned} planned"),
        }
    );
}
