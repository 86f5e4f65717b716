use std::process::ExitCode;

use clap::builder::styling::AnsiColor;
use log::{info, warn};

use crate::{
    error::Result,
    format::{format_key, format_path, format_time},
    lockfile::LockFile,
    manifest::Manifest,
};

use super::StatusArgs;

pub async fn main(cli: StatusArgs) -> Result<ExitCode> {
    let manifest_path = &cli.global.manifest;
    let manifest = Manifest::load(manifest_path).await?;
    let lock_file = LockFile::load(LockFile::path_for(manifest_path)).await?;

    if lock_file.is_empty() {
        info!("nothing has been frozen yet");
    }

    for entry in manifest.entries() {
        let record = lock_file.get(&entry.target_key);
        let (label, color) = if entry.force {
            ("force", AnsiColor::Yellow)
        } else if lock_file.is_frozen(&entry.target_key) {
            ("frozen", AnsiColor::Blue)
        } else {
            ("pending", AnsiColor::Cyan)
        };
        let style = color.on_default();
        let frozen_at = record
            .and_then(|record| record.frozen_at)
            .map(|time| format!(" (frozen {})", format_time(&time)))
            .unwrap_or_default();

        info!(
            "{style}{label:>7}{style:#} {} <- {}{frozen_at}",
            format_key(&entry.target_key),
            format_path(&entry.source)
        );
    }

    for (key, _) in lock_file.orphans(&manifest) {
        warn!(
            "{} is in {} but no longer in the manifest",
            format_key(key),
            format_path(lock_file.path())
        );
    }

    Ok(ExitCode::SUCCESS)
}
