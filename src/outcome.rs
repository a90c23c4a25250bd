use std::fmt;

use crate::error::GalaxyError;
use crate::upload::UploadItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferItem {
    Upload(UploadItem),
    Dataset(String),
}

impl fmt::Display for TransferItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferItem::Upload(item) => write!(f, "{}", item.local_path.display()),
            TransferItem::Dataset(id) => write!(f, "dataset {}", id),
        }
    }
}

/// What happened to one item of a batch. Only ever reported, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub item: TransferItem,
    pub status: TransferStatus,
    pub detail: Option<String>,
}

impl TransferOutcome {
    pub fn success(item: TransferItem, detail: impl Into<String>) -> Self {
        Self {
            item,
            status: TransferStatus::Success,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(item: TransferItem, detail: impl Into<String>) -> Self {
        Self {
            item,
            status: TransferStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(item: TransferItem, detail: impl Into<String>) -> Self {
        Self {
            item,
            status: TransferStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

/// Renders an error with its whole source chain on one line.
pub(crate) fn error_detail(err: GalaxyError) -> String {
    format!("{:#}", anyhow::Error::new(err))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, status: TransferStatus) {
        match status {
            TransferStatus::Success => self.succeeded += 1,
            TransferStatus::Skipped => self.skipped += 1,
            TransferStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// `1` when any item failed. Skipped items alone do not fail the run.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 { 1 } else { 0 }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}

/// Receives each outcome as soon as it is known.
pub trait Reporter {
    fn report(&mut self, outcome: &TransferOutcome);
}

impl Reporter for Vec<TransferOutcome> {
    fn report(&mut self, outcome: &TransferOutcome) {
        self.push(outcome.clone());
    }
}

/// Prints successes to stdout and everything else to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&mut self, outcome: &TransferOutcome) {
        let detail = outcome.detail.as_deref().unwrap_or("");
        match outcome.status {
            TransferStatus::Success => println!("{}: {}", outcome.item, detail),
            TransferStatus::Skipped => eprintln!("{} {}...skipping!", outcome.item, detail),
            TransferStatus::Failed => eprintln!("{}: failed: {}", outcome.item, detail),
        }
    }
}
