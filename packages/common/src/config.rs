use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Which broker adapter to build.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MqBackend {
    #[default]
    Redis,
    /// In-process log; only useful when producer and consumer share the process.
    Memory,
}

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    #[serde(default)]
    pub backend: MqBackend,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue carrying processing tasks. Default: "image_tasks".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// Send attempts per publish. Default: 5.
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,
    /// Pause between send attempts in milliseconds. Default: 3000.
    #[serde(default = "default_publish_delay_ms")]
    pub publish_delay_ms: u64,
    /// Partitions of the memory backend. Default: 4.
    #[serde(default = "default_partitions")]
    pub partitions: usize,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "image_tasks".into()
}
fn default_publish_attempts() -> u32 {
    5
}
fn default_publish_delay_ms() -> u64 {
    3000
}
fn default_partitions() -> usize {
    4
}

impl MqAppConfig {
    pub fn publish_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.publish_attempts,
            Duration::from_millis(self.publish_delay_ms),
        )
    }
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            backend: MqBackend::default(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
            publish_attempts: default_publish_attempts(),
            publish_delay_ms: default_publish_delay_ms(),
            partitions: default_partitions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    S3,
}

/// S3-compatible endpoint settings.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    #[serde(default = "default_s3_bucket")]
    pub bucket: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// e.g. "http://localhost:9000" for MinIO.
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Path-style addressing; MinIO needs this.
    #[serde(default = "default_true")]
    pub path_style: bool,
}

fn default_s3_bucket() -> String {
    "images".into()
}
fn default_s3_region() -> String {
    "us-east-1".into()
}
fn default_s3_endpoint() -> String {
    "http://localhost:9000".into()
}
fn default_true() -> bool {
    true
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: default_s3_bucket(),
            region: default_s3_region(),
            endpoint: default_s3_endpoint(),
            access_key: String::new(),
            secret_key: String::new(),
            path_style: default_true(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the filesystem backend. Default: "./data/blobs".
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Largest accepted blob in bytes. Default: 50 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    #[serde(default)]
    pub s3: S3Config,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    50 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            max_blob_size: default_max_blob_size(),
            s3: S3Config::default(),
        }
    }
}
