use std::{path::PathBuf, time::Duration};

use crate::error::Error;

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Uploaded { bytes: u64 },
    /// Already frozen and not forced.
    Skipped,
    /// Would have been uploaded, but this was a dry run.
    Planned,
    Failed(Error),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Uploaded { .. } => "uploaded",
            Outcome::Skipped => "skipped",
            Outcome::Planned => "planned",
            Outcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct EntryOutcome {
    pub target_key: String,
    pub source: PathBuf,
    pub outcome: Outcome,
}

/// What happened to every manifest entry, in manifest order.
///
/// If the run was aborted by a fatal error, that error is the outcome of the
/// entry that hit it and entries after it may have no outcome at all.
#[derive(Debug)]
pub struct Summary {
    pub outcomes: Vec<EntryOutcome>,
    pub elapsed: Duration,
    pub aborted: bool,
}

impl Summary {
    pub fn uploaded(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Uploaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| *outcome == Outcome::Skipped)
    }

    pub fn planned(&self) -> usize {
        self.count(|outcome| *outcome == Outcome::Planned)
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed(_)))
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|entry| match entry.outcome {
                Outcome::Uploaded { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, Outcome::Failed(_)))
    }

    fn count<F: Fn(&Outcome) -> bool>(&self, predicate: F) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}
