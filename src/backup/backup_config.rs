use crate::backup::archive::{ArchiveOptions, EntryNaming};
use crate::backup::bootstrap::RetryPolicy;
use crate::backup::compress::GzipConfig;
use crate::backup::exclusion::ExclusionSet;
use crate::backup::remote::RemoteKey;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{validate_absolute_dir, validate_key_segment};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Bucket receiving the archives unless configured otherwise
pub const DEFAULT_BUCKET_NAME: &str = "backups";
/// First segment of every object key
pub const DEFAULT_KEY_PREFIX: &str = "app-backups";

fn default_bucket() -> String {
    DEFAULT_BUCKET_NAME.to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Everything one backup pass needs, built once at startup.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Directory whose immediate subdirectories are backed up
    #[validate(custom(function = validate_absolute_dir))]
    #[builder(into)]
    base_dir: PathBuf,
    #[serde(default)]
    #[builder(default, into)]
    excludes: ExclusionSet,
    #[serde(default = "default_bucket")]
    #[validate(length(min = 1))]
    #[builder(default = default_bucket(), into)]
    bucket: String,
    #[serde(default = "default_key_prefix")]
    #[validate(custom(function = validate_key_segment))]
    #[builder(default = default_key_prefix(), into)]
    key_prefix: String,
    /// Host identity in object keys; resolved from the machine when left empty
    #[serde(default)]
    #[validate(custom(function = validate_key_segment))]
    #[builder(default, into)]
    host: String,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    gzip: GzipConfig,
    #[serde(default)]
    #[builder(default)]
    entry_naming: EntryNaming,
    /// Where archives are staged before upload, system temp dir otherwise
    #[validate(custom(function = validate_absolute_dir))]
    #[builder(into)]
    temp_dir: Option<PathBuf>,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    credential_retry: RetryPolicy,
}

impl BackupConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, BackupConfig>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))
    }

    /// Fills in the host identity from the machine's host name if none is set.
    pub fn resolve_host(mut self) -> Result<Self> {
        if self.host.is_empty() {
            self.host = local_hostname()?;
        }
        Ok(self)
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::builder()
            .gzip(self.gzip.clone())
            .entry_naming(self.entry_naming)
            .build()
    }

    pub fn remote_key(&self, target_name: &str) -> RemoteKey {
        RemoteKey::new(&self.key_prefix, &self.host, target_name)
    }
}

pub fn local_hostname() -> Result<String> {
    hostname::get()
        .map_err(Error::from)
        .with_msg("Could not determine system hostname")?
        .into_string()
        .map_err(|raw| Error::Hostname(raw.to_string_lossy().into_owned()))
}
