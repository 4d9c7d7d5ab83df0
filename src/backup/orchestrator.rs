//! One backup pass over the subdirectories of the base directory.
//!
//! Targets are handled one after another: archive into a temporary file, then
//! upload it. A failing target is recorded and the pass moves on; only a base
//! directory that cannot be listed, or cancellation, aborts the pass.

use crate::backup::archive::{archive_dir, ArchiveOptions, ArchiveStats};
use crate::backup::backup_config::BackupConfig;
use crate::backup::exclusion::ExclusionSet;
use crate::backup::remote::{ObjectStore, RemoteKey};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use derive_more::Display;
use itertools::Itertools;
use std::fs::{read_dir, File};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

static TEMP_FILE_PREFIX: &str = "subdir-backup-";
static TEMP_FILE_SUFFIX: &str = ".tar.gz";

/// Writes the archive of one target directory into its staging file
type Archiver = fn(&Path, &mut File, &ArchiveOptions) -> Result<ArchiveStats>;

fn archive_to_file(
    source_dir: &Path,
    file: &mut File,
    options: &ArchiveOptions,
) -> Result<ArchiveStats> {
    archive_dir(source_dir, file, options)
}

/// One subdirectory selected for this pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupTarget {
    pub name: String,
    pub path: PathBuf,
}

/// Step of a target's processing that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum TargetStage {
    #[display("temporary file")]
    TempFile,
    #[display("archive")]
    Archive,
    #[display("upload")]
    Upload,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Uploaded {
        target: BackupTarget,
        key: RemoteKey,
        stats: ArchiveStats,
        compressed_bytes: u64,
    },
    Failed {
        target: BackupTarget,
        stage: TargetStage,
        error: Error,
    },
}

impl TargetOutcome {
    pub fn target(&self) -> &BackupTarget {
        match self {
            TargetOutcome::Uploaded { target, .. } | TargetOutcome::Failed { target, .. } => {
                target
            }
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, TargetOutcome::Uploaded { .. })
    }
}

/// What a pass did, target by target
#[derive(Debug, Default)]
pub struct BackupSummary {
    pub outcomes: Vec<TargetOutcome>,
    /// Subdirectories skipped because their name is excluded
    pub excluded: Vec<String>,
}

impl BackupSummary {
    pub fn uploaded(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.is_uploaded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| !o.is_uploaded())
    }
}

/// Lists the immediate subdirectories of `base_dir`, in name order.
///
/// Returns the targets to back up and the names that were excluded.
/// Anything that is not a directory is skipped.
pub fn discover_targets(
    base_dir: &Path,
    exclusions: &ExclusionSet,
) -> Result<(Vec<BackupTarget>, Vec<String>)> {
    let entries = read_dir(base_dir)
        .and_then(|rd| rd.collect::<std::io::Result<Vec<_>>>())
        .map_err(Error::from)
        .with_msg(format!("Failed to read {:?}", base_dir))?;

    let mut targets = Vec::new();
    let mut excluded = Vec::new();
    for entry in entries.into_iter().sorted_by_key(|e| e.file_name()) {
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("Skipping {:?}, cannot read its type: {}", entry.path(), e);
                continue;
            }
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if exclusions.is_excluded(&name) {
            tracing::info!("Skipping excluded directory {:?}", entry.path());
            excluded.push(name);
            continue;
        }

        targets.push(BackupTarget {
            name,
            path: entry.path(),
        });
    }

    Ok((targets, excluded))
}

/// Backs up every eligible subdirectory of the configured base directory.
///
/// Per-target failures end up in the summary; the returned error is reserved
/// for an unreadable base directory and cancellation.
pub async fn run_backup<S: ObjectStore>(
    config: &BackupConfig,
    store: &S,
    cancel: &CancellationToken,
) -> Result<BackupSummary> {
    run_backup_with(config, store, cancel, archive_to_file).await
}

async fn run_backup_with<S: ObjectStore>(
    config: &BackupConfig,
    store: &S,
    cancel: &CancellationToken,
    archiver: Archiver,
) -> Result<BackupSummary> {
    tracing::info!("Scanning {:?}", config.base_dir());
    let (targets, excluded) = discover_targets(config.base_dir(), config.excludes())?;
    let mut summary = BackupSummary {
        outcomes: Vec::with_capacity(targets.len()),
        excluded,
    };

    for target in targets {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled).with_msg(format!(
                "Backup pass interrupted before {:?}",
                target.path
            ));
        }

        tracing::info!("Backing up {:?}", target.path);
        let outcome = match backup_target(config, store, cancel, archiver, &target).await {
            Ok((key, stats, compressed_bytes)) => TargetOutcome::Uploaded {
                target,
                key,
                stats,
                compressed_bytes,
            },
            Err((stage, error)) => {
                tracing::error!("Could not back up {:?} ({} failed): {}", target.path, stage, error);
                TargetOutcome::Failed {
                    target,
                    stage,
                    error,
                }
            }
        };
        summary.outcomes.push(outcome);
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled).with_msg("Backup pass interrupted");
    }

    tracing::info!(
        "Backup pass complete: {} uploaded, {} failed, {} excluded",
        summary.uploaded().count(),
        summary.failed().count(),
        summary.excluded.len()
    );
    Ok(summary)
}

type TargetResult<T> = std::result::Result<T, (TargetStage, Error)>;

async fn backup_target<S: ObjectStore>(
    config: &BackupConfig,
    store: &S,
    cancel: &CancellationToken,
    archiver: Archiver,
    target: &BackupTarget,
) -> TargetResult<(RemoteKey, ArchiveStats, u64)> {
    // Removed from disk when dropped, whichever way this function exits
    let temp = create_temp_file(config)
        .with_msg("Could not create temporary archive file")
        .map_err(|e| (TargetStage::TempFile, e))?;

    tracing::info!("Creating archive...");
    let source_dir = target.path.clone();
    let options = config.archive_options();
    let (temp, archived) = tokio::task::spawn_blocking(move || {
        let mut temp = temp;
        let archived = archiver(&source_dir, temp.as_file_mut(), &options);
        (temp, archived)
    })
    .await
    .map_err(|e| (TargetStage::Archive, Error::from(e)))?;
    let stats = archived
        .with_msg(format!("Could not archive {:?}", target.path))
        .map_err(|e| (TargetStage::Archive, e))?;

    let key = config.remote_key(&target.name);
    let (artifact, compressed_bytes) = reopen(&temp)
        .with_msg(format!("Could not reopen archive of {:?}", target.path))
        .map_err(|e| (TargetStage::Upload, e))?;

    tracing::info!(
        "Uploading archive ({} bytes) to {}...",
        compressed_bytes,
        store.location(&key)
    );
    let uploaded = tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = store.upload(&key, artifact) => res,
    };
    uploaded
        .with_msg(format!("Could not upload archive to {}", store.location(&key)))
        .map_err(|e| (TargetStage::Upload, e))?;
    tracing::info!("Upload complete!");

    drop(temp);
    Ok((key, stats, compressed_bytes))
}

fn create_temp_file(config: &BackupConfig) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX).suffix(TEMP_FILE_SUFFIX);
    let temp = match config.temp_dir() {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }?;
    Ok(temp)
}

fn reopen(temp: &NamedTempFile) -> Result<(tokio::fs::File, u64)> {
    let file = temp.reopen()?;
    let len = file.metadata()?.len();
    Ok((tokio::fs::File::from_std(file), len))
}
