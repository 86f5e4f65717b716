//! The upload orchestrator.
//!
//! Entries are dispatched strictly in manifest order. An entry that is
//! already frozen (and not forced) is skipped without touching the source or
//! the backend. Anything else is archived if it is a directory, uploaded, and
//! only then marked frozen in the lock file. A failed entry is reported and
//! left pending, so the next run retries it.

mod summary;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use clap::builder::styling::AnsiColor;
use log::{debug, error};
use tokio::{
    fs,
    sync::{Mutex, Semaphore},
    task::{JoinError, JoinSet},
};

use crate::{
    archive::Archiver,
    error::{Error, Result},
    format::{format_key, format_path, format_size},
    lockfile::LockFile,
    locks::KeyLocks,
    manifest::{EntryKind, Manifest, ManifestEntry},
    storage::BoxedStorage,
};

pub use summary::{EntryOutcome, Outcome, Summary};

#[derive(Debug)]
struct Context {
    storage: BoxedStorage,
    archiver: Archiver,
}

#[derive(Debug)]
pub struct Freezer {
    context: Arc<Context>,
    jobs: usize,
    dry_run: bool,
}

type Joined = std::result::Result<(usize, Result<Outcome>), JoinError>;

impl Freezer {
    pub fn new(storage: BoxedStorage, archiver: Archiver) -> Self {
        Freezer {
            context: Arc::new(Context { storage, archiver }),
            jobs: 1,
            dry_run: false,
        }
    }

    /// Allows up to `jobs` entries with distinct target keys in flight at
    /// once. With more than one job, a later entry may finish before an
    /// earlier one.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Freezes every entry of `manifest`, recording progress in `lock_file`.
    ///
    /// Per-entry failures end up in the returned [`Summary`]. A fatal error,
    /// e.g. a lock file that could not be written, stops dispatching further
    /// entries; it is recorded against its entry and the summary is marked
    /// aborted. An `Err` is only returned if the run could not be driven at
    /// all.
    pub async fn run(&self, manifest: &Manifest, lock_file: LockFile) -> Result<Summary> {
        let start_time = Instant::now();
        let entries = manifest.entries();
        let lock_file = Arc::new(Mutex::new(lock_file));
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut key_locks = KeyLocks::new();
        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<Option<Outcome>> = entries.iter().map(|_| None).collect();
        let mut fatal = false;

        for (index, entry) in entries.iter().enumerate() {
            let key_permit = key_locks.lock(&entry.target_key).await?;
            let job_permit = semaphore.clone().acquire_owned().await?;

            while let Some(joined) = tasks.try_join_next() {
                collect(joined, &mut outcomes, &mut fatal)?;
            }
            if aborted.load(Ordering::SeqCst) {
                break;
            }

            if !entry.force && lock_file.lock().await.is_frozen(&entry.target_key) {
                let style = AnsiColor::BrightBlack.on_default();
                debug!(
                    "{style}skipped{style:#} {} (already frozen)",
                    format_key(&entry.target_key)
                );
                outcomes[index] = Some(Outcome::Skipped);
                continue;
            }

            if self.dry_run {
                log_planned(entry);
                outcomes[index] = Some(Outcome::Planned);
                continue;
            }

            let context = self.context.clone();
            let lock_file = lock_file.clone();
            let aborted = aborted.clone();
            let entry = entry.clone();

            tasks.spawn(async move {
                let result = freeze_entry(&context, &lock_file, &entry).await;
                if result.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                }
                drop(job_permit);
                drop(key_permit);
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut outcomes, &mut fatal)?;
        }

        let outcomes = entries
            .iter()
            .zip(outcomes)
            .filter_map(|(entry, outcome)| {
                outcome.map(|outcome| EntryOutcome {
                    target_key: entry.target_key.clone(),
                    source: entry.source.clone(),
                    outcome,
                })
            })
            .collect();

        Ok(Summary {
            outcomes,
            elapsed: start_time.elapsed(),
            aborted: fatal,
        })
    }
}

fn collect(joined: Joined, outcomes: &mut [Option<Outcome>], fatal: &mut bool) -> Result<()> {
    let (index, result) = joined?;
    outcomes[index] = Some(match result {
        Ok(outcome) => outcome,
        Err(err) => {
            *fatal = true;
            Outcome::Failed(err)
        }
    });
    Ok(())
}

/// Transfers one entry and marks it frozen. Transfer problems become
/// `Outcome::Failed`; fatal errors, such as a failure to record success, are
/// returned as `Err`.
async fn freeze_entry(
    context: &Context,
    lock_file: &Mutex<LockFile>,
    entry: &ManifestEntry,
) -> Result<Outcome> {
    let bytes = match transfer(context, entry).await {
        Ok(bytes) => bytes,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            error!("{err}");
            return Ok(Outcome::Failed(err));
        }
    };

    let mut lock_file = lock_file.lock().await;
    if let Err(err) = lock_file.mark_frozen(entry).await {
        return Err(Error::unrecorded(&entry.target_key, lock_file.path(), err));
    }
    drop(lock_file);

    let style = AnsiColor::Blue.on_default();
    let size_style = AnsiColor::BrightBlack.on_default();
    debug!(
        "{style}uploaded{style:#} {} as {} {size_style}({}, {}){size_style:#}",
        format_path(&entry.source),
        format_key(&entry.target_key),
        entry.storage_class,
        format_size(bytes)
    );
    Ok(Outcome::Uploaded { bytes })
}

async fn transfer(context: &Context, entry: &ManifestEntry) -> Result<u64> {
    match fs::try_exists(&entry.source).await {
        Ok(true) => {}
        Ok(false) => return Err(Error::SourceDoesNotExist(entry.source.clone())),
        Err(err) => return Err(Error::other(err).into_transfer(&entry.target_key)),
    }

    match entry.kind {
        EntryKind::File => upload(context, &entry.source, entry).await,
        EntryKind::Directory => {
            let style = AnsiColor::Magenta.on_default();
            debug!(
                "{style}archiving{style:#} {}",
                format_path(&entry.source)
            );
            let archived = context
                .archiver
                .archive(&entry.source, &entry.target_key)
                .await?;
            debug!(
                "archived {} files into {} ({})",
                archived.file_count(),
                format_path(archived.path()),
                format_size(archived.size())
            );
            upload(context, archived.path(), entry).await
        }
    }
}

async fn upload(context: &Context, local_path: &Path, entry: &ManifestEntry) -> Result<u64> {
    let style = AnsiColor::Cyan.on_default();
    debug!(
        "{style}uploading{style:#} {} to {}",
        format_path(local_path),
        format_key(&entry.target_key)
    );

    context
        .storage
        .upload(local_path, &entry.target_key, entry.storage_class)
        .await
        .map_err(|err| err.into_transfer(&entry.target_key))
}

fn log_planned(entry: &ManifestEntry) {
    let style = AnsiColor::Yellow.on_default();
    let action = if entry.is_directory() {
        "would archive and upload"
    } else {
        "would upload"
    };
    debug!(
        "{style}{action}{style:#} {} as {} ({})",
        format_path(&entry.source),
        format_key(&entry.target_key),
        entry.storage_class
    );
}
