use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use subdir_backup::backup::archive::EntryNaming;
use subdir_backup::backup::backup_config::{BackupConfig, DEFAULT_BUCKET_NAME, DEFAULT_KEY_PREFIX};
use subdir_backup::backup::bootstrap::validate_credentials;
use subdir_backup::backup::exclusion::ExclusionSet;
use subdir_backup::backup::orchestrator::{run_backup, BackupSummary, TargetOutcome};
use subdir_backup::backup::remote::{S3Settings, S3Store};
use subdir_backup::backup::result_error::error::Error;
use subdir_backup::backup::result_error::result::Result;
use subdir_backup::backup::result_error::WithMsg;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use validator::Validate;

/// Archive every subdirectory of a folder and upload it to object storage
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The folder whose subdirectories are backed up (absolute path)
    #[arg(short, long, required_unless_present = "config", conflicts_with = "config")]
    folder: Option<PathBuf>,

    /// Subdirectory name to exclude from backup, may be repeated
    #[arg(short, long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Bucket receiving the archives
    #[arg(long, default_value = DEFAULT_BUCKET_NAME)]
    bucket: String,

    /// First segment of every object key
    #[arg(long, default_value = DEFAULT_KEY_PREFIX)]
    prefix: String,

    /// Name archive entries relative to the subdirectory instead of by full path
    #[arg(long)]
    relative_names: bool,

    /// Load the whole configuration from a YAML file instead
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<BackupConfig> {
        let config = match (self.config, self.folder) {
            (Some(path), _) => BackupConfig::from_yaml_file(path)?,
            (None, Some(folder)) => {
                let entry_naming = if self.relative_names {
                    EntryNaming::Relative
                } else {
                    EntryNaming::FullPath
                };
                BackupConfig::builder()
                    .base_dir(folder)
                    .excludes(ExclusionSet::new(self.exclude))
                    .bucket(self.bucket)
                    .key_prefix(self.prefix)
                    .entry_naming(entry_naming)
                    .build()
            }
            (None, None) => {
                return Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "--folder or --config is required",
                )))
            }
        };

        let config = config.resolve_host()?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", config.base_dir()))?;
        Ok(config)
    }
}

fn watch_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling backup");
                cancel.cancel();
            }
            Err(e) => warn!("Could not listen for interrupt: {e}"),
        }
    });
}

async fn run(args: Args) -> Result<BackupSummary> {
    let config = args.into_config()?;

    let cancel = CancellationToken::new();
    watch_interrupt(cancel.clone());

    info!("Initializing S3 client");
    let store = S3Store::from_settings(config.bucket().clone(), &S3Settings::from_env()).await;
    let store = validate_credentials(store, config.credential_retry(), &cancel).await?;

    info!("Performing backup of {:?} subdirectories", config.base_dir());
    run_backup(&config, &store, &cancel).await
}

fn report(summary: &BackupSummary) {
    for outcome in &summary.outcomes {
        match outcome {
            TargetOutcome::Uploaded {
                target,
                key,
                stats,
                compressed_bytes,
            } => info!(
                "{}: {} files, {} bytes -> {} ({} bytes)",
                target.name, stats.entries, stats.bytes, key, compressed_bytes
            ),
            TargetOutcome::Failed { target, stage, .. } => {
                warn!("{}: {} failed, see above", target.name, stage)
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args).await {
        Ok(summary) => report(&summary),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
