//! Upload files to, and download datasets from, a Galaxy server.
//!
//! Two binaries ship with this crate:
//! - `galaxy-download` fetches datasets by id, or by exact name within an optional history.
//! - `galaxy-upload` pushes local files into a history, resuming interrupted
//!   transfers from a checkpoint directory.
//!
//! ## Configuration
//! Credentials come from (highest precedence first) `--ask-api-key` / `--url`, the
//! environment variables `GALAXY_URL` and `GALAXY_API_KEY`, a dotenv file (`.env`
//! by default), or a `.galaxyrc` file in the current or home directory.
//!
//! ```no_run
//! use anyhow::Result;
//! use galaxy_transfer::{ConnectionConfig, ConsoleReporter, DatasetFilter, GalaxyInstance, download_all};
//! use std::path::Path;
//!
//! fn main() -> Result<()> {
//!     let config = ConnectionConfig::new("https://usegalaxy.org", "my-api-key", true)?;
//!     let galaxy = GalaxyInstance::new(&config)?;
//!     let filter = DatasetFilter {
//!         dataset_name: Some("reads.fastqsanger".to_string()),
//!         ..DatasetFilter::default()
//!     };
//!     download_all(&galaxy, &filter, Path::new("."), &mut ConsoleReporter)?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod cli;
mod client;
mod config;
mod datasets;
mod error;
mod outcome;
mod tus;
mod upload;
mod util;

#[cfg(test)]
mod testing;

pub use client::{GalaxyApi, GalaxyInstance, UploadRequest, UploadResponse};
pub use config::{ConnectionConfig, CredentialSources, KEY_VAR, URL_VAR};
pub use datasets::{
    DatasetFilter, DatasetQuery, DatasetRecord, download_all, fetch_one, resolve_targets,
};
pub use error::GalaxyError;
pub use outcome::{ConsoleReporter, Reporter, Summary, TransferItem, TransferOutcome, TransferStatus};
pub use tus::{CHECKPOINT_INDEX, CheckpointEntry, CheckpointStore, DEFAULT_CHUNK_SIZE, fingerprint};
pub use upload::{UploadItem, UploadOptions, stale_checkpoint_detail, upload_all, upload_one};
