//! # subdir-backup
//!
//! Backs up each subdirectory of a base path to an S3-compatible object store.
//!
//! ## Features
//!
//! - **One archive per subdirectory**: streamed tar + gzip, staged in a temporary file
//! - **Exclusions**: skip subdirectories by exact name
//! - **Host-scoped keys**: `{prefix}/{hostname}/{subdirectory}`
//! - **Best effort**: a failing subdirectory is reported and the pass moves on
//! - **Credential pre-flight**: bounded, cancellable probe before any work starts
//!
//! ## Quick Start
//!
//! ```no_run
//! use subdir_backup::backup::backup_config::BackupConfig;
//! use subdir_backup::backup::bootstrap::validate_credentials;
//! use subdir_backup::backup::orchestrator::run_backup;
//! use subdir_backup::backup::remote::{S3Settings, S3Store};
//! use tokio_util::sync::CancellationToken;
//! use validator::Validate;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::from_yaml_file("config.yml")?.resolve_host()?;
//! config.validate()?;
//!
//! let cancel = CancellationToken::new();
//! let store = S3Store::from_settings(config.bucket().clone(), &S3Settings::from_env()).await;
//! let store = validate_credentials(store, config.credential_retry(), &cancel).await?;
//! let summary = run_backup(&config, &store, &cancel).await?;
//! println!("{} uploaded", summary.uploaded().count());
//! # Ok(())
//! # }
//! ```

pub mod backup;
