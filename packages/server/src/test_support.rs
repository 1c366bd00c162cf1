use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::storage::{BlobInfo, BlobStore, ContentHash, StorageError, content_type_for};
use common::{BlobKey, ProcessingTask, RetryPolicy};
use mq::{Broker, Delivery, MemoryBroker, MqError, Producer};
use sea_orm::DatabaseConnection;

use crate::assets::AssetService;
use crate::database::testing::memory_db;
use crate::transform::PassthroughTransformer;

/// Blob store in a map, with switches to make writes or deletes fail.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &BlobKey) -> bool {
        self.blobs.lock().unwrap().contains_key(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: &[u8], key: &BlobKey) -> Result<BlobInfo, StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("puts disabled".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), data.to_vec());
        Ok(BlobInfo {
            key: key.clone(),
            size: data.len() as u64,
            content_type: content_type_for(data),
            etag: ContentHash::compute(data).to_hex(),
        })
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("deletes disabled".into()));
        }
        Ok(self.blobs.lock().unwrap().remove(key.as_str()).is_some())
    }
}

/// Broker whose sends always fail.
pub struct DownBroker;

#[async_trait]
impl Broker for DownBroker {
    async fn send(&self, _key: &str, _payload: &[u8]) -> Result<(), MqError> {
        Err(MqError::BrokerUnavailable("broker down".into()))
    }

    async fn receive(&self) -> Result<Delivery, MqError> {
        Err(MqError::BrokerUnavailable("broker down".into()))
    }

    async fn commit(&self, _delivery: Delivery) -> Result<(), MqError> {
        Ok(())
    }

    async fn release(&self, _delivery: Delivery) -> Result<(), MqError> {
        Ok(())
    }
}

/// An asset service wired to in-memory stores.
pub struct Harness {
    pub service: Arc<AssetService>,
    pub db: DatabaseConnection,
    pub blobs: Arc<MemoryBlobStore>,
    pub broker: Arc<MemoryBroker>,
}

impl Harness {
    pub async fn new() -> Self {
        let broker = Arc::new(MemoryBroker::new(4));
        Self::build(Arc::clone(&broker) as Arc<dyn Broker>, broker).await
    }

    /// Harness whose producer publishes through `publish_to` instead of the memory log.
    pub async fn with_broker(publish_to: Arc<dyn Broker>) -> Self {
        Self::build(publish_to, Arc::new(MemoryBroker::new(4))).await
    }

    async fn build(publish_to: Arc<dyn Broker>, broker: Arc<MemoryBroker>) -> Self {
        let db = memory_db().await;
        let blobs = Arc::new(MemoryBlobStore::default());
        let service = Arc::new(AssetService::new(
            db.clone(),
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Producer::new(publish_to, RetryPolicy::none()),
            Arc::new(PassthroughTransformer),
            "http://localhost:3000",
        ));
        Self {
            service,
            db,
            blobs,
            broker,
        }
    }

    /// Tasks published so far and not yet committed.
    pub async fn published(&self) -> Vec<ProcessingTask> {
        self.broker
            .backlog()
            .await
            .into_iter()
            .map(|(_, payload)| serde_json::from_slice(&payload).unwrap())
            .collect()
    }
}
