//! Object store access: where archives go and how credentials get probed.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use derive_more::Display;
use getset::Getters;

/// Environment variable naming the store region
pub static REGION_ENV: &str = "AWS_REGION";
/// Environment variable holding an alternate endpoint URL (S3-compatible stores)
pub static ENDPOINT_ENV: &str = "AWS_ENDPOINT";

/// Destination of one uploaded archive: `{prefix}/{host}/{target}`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn new(prefix: &str, host: &str, target: &str) -> Self {
        Self(format!("{prefix}/{host}/{target}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The remote side of a backup pass.
///
/// Implementations report the store's own error and never retry.
#[async_trait]
pub trait ObjectStore {
    /// Lightweight authenticated call without side effects, used to check credentials.
    async fn probe(&self) -> Result<()>;

    /// Streams `artifact` to `key`, creating or overwriting the object.
    async fn upload(&self, key: &RemoteKey, artifact: tokio::fs::File) -> Result<()>;

    /// Human readable location of `key`, for logs.
    fn location(&self, key: &RemoteKey) -> String;
}

/// Client settings read from the process environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl S3Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from `lookup`; empty values count as unset.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            region: read(REGION_ENV),
            endpoint: read(ENDPOINT_ENV),
        }
    }
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new<S: Into<String>>(client: Client, bucket: S) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_settings<S: Into<String>>(bucket: S, settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            tracing::info!("Using object store endpoint {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // S3-compatible endpoints rarely support virtual-hosted buckets
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        Self::new(Client::from_conf(s3_config), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn probe(&self) -> Result<()> {
        self.client.list_buckets().send().await?;
        Ok(())
    }

    async fn upload(&self, key: &RemoteKey, artifact: tokio::fs::File) -> Result<()> {
        let body = ByteStream::read_from().file(artifact).build().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(body)
            .send()
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    fn location(&self, key: &RemoteKey) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;

    #[derive(Default)]
    struct MemoryState {
        probe_failures_left: AtomicU32,
        probes: AtomicU32,
        failing_keys: Mutex<BTreeSet<String>>,
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    /// In-memory store with scripted failures
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        state: Arc<MemoryState>,
    }

    impl MemoryStore {
        pub(crate) fn failing_probes(count: u32) -> Self {
            let store = Self::default();
            store
                .state
                .probe_failures_left
                .store(count, Ordering::SeqCst);
            store
        }

        pub(crate) fn fail_uploads_to(&self, key: &str) {
            self.state.failing_keys.lock().unwrap().insert(key.to_string());
        }

        pub(crate) fn probes(&self) -> u32 {
            self.state.probes.load(Ordering::SeqCst)
        }

        pub(crate) fn objects(&self) -> BTreeMap<String, Vec<u8>> {
            self.state.objects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn probe(&self) -> Result<()> {
            self.state.probes.fetch_add(1, Ordering::SeqCst);
            let left = self.state.probe_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.state
                    .probe_failures_left
                    .store(left - 1, Ordering::SeqCst);
                return Err(Error::ObjectStore("InvalidAccessKeyId".to_string()));
            }
            Ok(())
        }

        async fn upload(&self, key: &RemoteKey, mut artifact: tokio::fs::File) -> Result<()> {
            if self.state.failing_keys.lock().unwrap().contains(key.as_str()) {
                return Err(Error::ObjectStore(format!("AccessDenied for {key}")));
            }
            let mut bytes = Vec::new();
            artifact.read_to_end(&mut bytes).await?;
            self.state
                .objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes);
            Ok(())
        }

        fn location(&self, key: &RemoteKey) -> String {
            format!("memory://{key}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_remote_key_layout() {
        let key = RemoteKey::new("app-backups", "web-01", "app1");
        assert_eq!(key.as_str(), "app-backups/web-01/app1");
        assert_eq!(key.to_string(), "app-backups/web-01/app1");
    }

    #[test]
    fn test_remote_key_distinguishes_hosts_and_targets() {
        let a = RemoteKey::new("app-backups", "web-01", "app1");
        assert_ne!(a, RemoteKey::new("app-backups", "web-02", "app1"));
        assert_ne!(a, RemoteKey::new("app-backups", "web-01", "app2"));
        assert_eq!(a, RemoteKey::new("app-backups", "web-01", "app1"));
    }

    #[test]
    fn test_settings_ignore_empty_values() {
        let vars = HashMap::from([(REGION_ENV, "eu-west-1"), (ENDPOINT_ENV, "")]);
        let settings = S3Settings::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.endpoint, None);
    }

    #[test]
    fn test_settings_read_endpoint() {
        let vars = HashMap::from([(ENDPOINT_ENV, "http://127.0.0.1:9000")]);
        let settings = S3Settings::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(settings.region, None);
        assert_eq!(settings.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn test_s3_store_location() {
        let settings = S3Settings {
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
        };
        let store = S3Store::from_settings("archive", &settings).await;
        let key = RemoteKey::new("app-backups", "host", "app1");
        assert_eq!(store.location(&key), "s3://archive/app-backups/host/app1");
        assert_eq!(store.bucket(), "archive");
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_object() {
        let store = MemoryStore::default();
        let key = RemoteKey::new("p", "h", "t");

        for content in ["first", "second"] {
            let mut temp = tempfile::NamedTempFile::new().unwrap();
            temp.write_all(content.as_bytes()).unwrap();
            let file = tokio::fs::File::from_std(temp.reopen().unwrap());
            store.upload(&key, file).await.unwrap();
        }

        let objects = store.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects["p/h/t"], b"second");
    }
}
