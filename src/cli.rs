//! Command-line arguments shared by the `galaxy-download` and `galaxy-upload` binaries.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::GalaxyInstance;
use crate::config::{ConnectionConfig, CredentialSources};
use crate::datasets::DatasetFilter;
use crate::tus::DEFAULT_CHUNK_SIZE;
use crate::upload::{UploadItem, UploadOptions};

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Configuration environment file [default: .env]
    #[arg(short = 'e', long, value_name = "PATH")]
    pub envfile: Option<PathBuf>,

    /// Prompt for the Galaxy API key
    #[arg(long)]
    pub ask_api_key: bool,

    /// Galaxy URL endpoint (or via GALAXY_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Seconds to wait for a Galaxy API call; file transfers are not limited
    #[arg(long, env = "GALAXY_TIMEOUT", default_value_t = 60, value_name = "SECS")]
    pub timeout: u64,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl ConnectionArgs {
    /// Resolves credentials, prompting for the API key first if asked to.
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let sources = CredentialSources::gather(self.envfile.as_deref())?;
        let prompted = if self.ask_api_key {
            log::debug!("Asking for Galaxy API key");
            Some(prompt_api_key()?)
        } else {
            None
        };

        let config = sources
            .with_url_flag(self.url.clone())
            .with_prompted_key(prompted)
            .with_insecure(self.insecure)
            .resolve()?;
        Ok(config)
    }

    pub fn connect(&self) -> Result<GalaxyInstance> {
        let config = self.resolve()?;
        let galaxy = GalaxyInstance::new(&config)?
            .with_timeout(Duration::from_secs(self.timeout))
            .with_progress(!self.no_progress);
        log::info!("Connecting to {}", galaxy.url());
        Ok(galaxy)
    }
}

pub fn prompt_api_key() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Galaxy API key")
        .interact()
        .context("failed to read API key from terminal")
}

/// `-v` count to log level; `RUST_LOG` still wins when set.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[derive(Debug, Parser)]
#[command(name = "galaxy-download")]
#[command(about = "Galaxy dataset download utility.")]
#[command(version)]
pub struct DownloadCli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// History id to filter on
    #[arg(long)]
    pub history_id: Option<String>,

    /// Dataset id to filter on
    #[arg(long)]
    pub dataset_id: Option<String>,

    /// Exact dataset name to filter on
    #[arg(long)]
    pub dataset_name: Option<String>,

    /// Output directory or file name to write to
    #[arg(long, default_value = ".")]
    pub filepath: PathBuf,
}

impl DownloadCli {
    pub fn filter(&self) -> DatasetFilter {
        DatasetFilter {
            dataset_id: self.dataset_id.clone(),
            dataset_name: self.dataset_name.clone(),
            history_id: self.history_id.clone(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "galaxy-upload")]
#[command(about = "Galaxy file upload utility.")]
#[command(version)]
pub struct UploadCli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// History id to upload into
    #[arg(long)]
    pub history_id: String,

    /// Input file paths to upload
    #[arg(long, required = true, num_args = 1..)]
    pub file: Vec<PathBuf>,

    /// Checkpoint directory for resumable uploads [default: ./.checkpoints]
    #[arg(long, value_name = "DIR")]
    pub checkpoints: Option<PathBuf>,

    /// Upload without recording checkpoints
    #[arg(long, conflicts_with = "checkpoints")]
    pub no_checkpoints: bool,

    /// Bytes sent per upload request
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Galaxy datatype of the uploaded files
    #[arg(long, default_value = "auto")]
    pub file_type: String,

    /// Genome build of the uploaded files
    #[arg(long, default_value = "?")]
    pub dbkey: String,
}

impl UploadCli {
    pub fn checkpoint_dir(&self) -> Result<Option<PathBuf>> {
        if self.no_checkpoints {
            return Ok(None);
        }
        match &self.checkpoints {
            Some(dir) => Ok(Some(dir.clone())),
            None => {
                let cwd = std::env::current_dir().context("failed to read current directory")?;
                Ok(Some(cwd.join(".checkpoints")))
            }
        }
    }

    pub fn items(&self) -> Result<Vec<UploadItem>> {
        let checkpoint_dir = self.checkpoint_dir()?;
        Ok(UploadItem::from_args(
            &self.file,
            &self.history_id,
            checkpoint_dir.as_deref(),
        ))
    }

    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.chunk_size,
            file_type: self.file_type.clone(),
            dbkey: self.dbkey.clone(),
            ..UploadOptions::default()
        }
    }
}
