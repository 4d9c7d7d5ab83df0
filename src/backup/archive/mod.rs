//! Streams one directory tree into a gzip-compressed tar archive.
//!
//! Layers, outermost first: `tar::Builder` -> `GzEncoder` -> `BufWriter` -> sink.
//! They are finished in that order so each layer flushes its trailer into the
//! one beneath it before that one is closed. On an early return every layer is
//! dropped, which releases it.

use crate::backup::compress::{CompressorBuilder, GzipConfig};
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::{File, Metadata};
use std::io::{BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{EntryType, Header};
use walkdir::WalkDir;

/// How an archived file is named inside the tar stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryNaming {
    /// The path exactly as discovered by the walk, minus the leading root
    /// (tar member names cannot be absolute).
    #[default]
    FullPath,
    /// The path relative to the archived directory.
    Relative,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct ArchiveOptions {
    #[builder(default)]
    gzip: GzipConfig,
    #[builder(default)]
    entry_naming: EntryNaming,
}

/// What went into one archive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Number of regular files written
    pub entries: u64,
    /// Sum of the uncompressed file sizes
    pub bytes: u64,
}

/// Writes every regular file under `source_dir` into `sink` as a tar.gz stream.
///
/// Directories contribute no entries. Entries follow walk order. The first file
/// that cannot be opened, stat'ed or fully copied aborts the whole archive.
#[named]
pub fn archive_dir<W: Write>(
    source_dir: &Path,
    sink: W,
    options: &ArchiveOptions,
) -> Result<ArchiveStats> {
    tracing::debug!("Creating archive of {:?}", source_dir);
    let compressor = options.gzip.build_compressor(BufWriter::new(sink));
    let mut builder = tar::Builder::new(compressor);

    let stats = append_tree(&mut builder, source_dir, options.entry_naming)
        .and_then(|stats| {
            let compressor = Finish::finish(builder)?;
            let buffered = Finish::finish(compressor)?;
            let mut sink = Finish::finish(buffered)?;
            sink.flush()?;
            Ok(stats)
        })
        .with_debug_object_and_fn_name(source_dir.to_path_buf(), function_path!())?;

    tracing::info!(
        "Archived {} files ({} bytes) from {:?}",
        stats.entries,
        stats.bytes,
        source_dir
    );
    Ok(stats)
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    source_dir: &Path,
    naming: EntryNaming,
) -> Result<ArchiveStats> {
    let mut stats = ArchiveStats::default();
    for entry in WalkDir::new(source_dir) {
        let entry = entry
            .map_err(Error::from)
            .with_msg(format!("Failed to read directory entry under {:?}", source_dir))?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            tracing::trace!("Skipping {:?}, not a regular file", entry.path());
            continue;
        }

        tracing::debug!("Compressing {:?}", entry.path());
        let name = entry_name(entry.path(), source_dir, naming)?;
        stats.bytes += append_file(builder, entry.path(), &name)
            .with_msg(format!("Could not add file {:?} to archive", entry.path()))?;
        stats.entries += 1;
    }
    Ok(stats)
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &Path, name: &Path) -> Result<u64> {
    let file = File::open(path)
        .map_err(Error::from)
        .with_msg(format!("Could not open file {:?}", path))?;
    let metadata = file
        .metadata()
        .map_err(Error::from)
        .with_msg(format!("Could not stat file {:?}", path))?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(permission_bits(&metadata));
    header.set_mtime(modified_secs(&metadata));
    append_body(builder, header, name, file, metadata.len(), path)
}

/// Appends the first `size` bytes of `body` under `name`.
///
/// `size` is the stat size; a body that ends sooner is `Error::Incomplete`.
fn append_body<W: Write, R: Read>(
    builder: &mut tar::Builder<W>,
    mut header: Header,
    name: &Path,
    body: R,
    size: u64,
    path: &Path,
) -> Result<u64> {
    header.set_size(size);
    // Bytes appended after the stat are not ours to write
    let mut body = body.take(size);
    builder
        .append_data(&mut header, name, &mut body)
        .map_err(Error::from)
        .with_msg(format!("Could not copy {:?} into archive", path))?;

    if body.limit() != 0 {
        return Err(Error::Incomplete {
            path: path.to_path_buf(),
            expected: size,
            copied: size - body.limit(),
        });
    }
    Ok(size)
}

fn entry_name(path: &Path, source_dir: &Path, naming: EntryNaming) -> Result<PathBuf> {
    match naming {
        EntryNaming::FullPath => Ok(lexical_name(path)),
        EntryNaming::Relative => Ok(path.strip_prefix(source_dir)?.to_path_buf()),
    }
}

/// `path` without its root, with `.` and `..` resolved lexically.
///
/// Tar member names may contain neither a root nor `..`.
fn lexical_name(path: &Path) -> PathBuf {
    let mut name = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                name.pop();
            }
            Component::Normal(part) => name.push(part),
        }
    }
    name
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
