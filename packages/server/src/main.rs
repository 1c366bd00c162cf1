use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::config::{MqAppConfig, MqBackend, StorageBackend, StorageConfig};
use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use imgflow_server::assets::AssetService;
use imgflow_server::build_router;
use imgflow_server::config::AppConfig;
use imgflow_server::database::init_db;
use imgflow_server::lifecycle::{Component, StopReason, Supervisor};
use imgflow_server::state::AppState;
use imgflow_server::transform::PassthroughTransformer;
use mq::{Broker, Consumer, MemoryBroker, MqConfig, Producer, RedisBroker};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    let db = init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    let blobs = init_blob_store(&config.storage).await?;
    let broker = init_broker(&config.mq).await?;

    let producer = Producer::new(Arc::clone(&broker), config.mq.publish_retry());
    let consumer = Consumer::new(broker);

    let assets = Arc::new(AssetService::new(
        db.clone(),
        blobs,
        producer,
        Arc::new(PassthroughTransformer),
        config.server.base_url.clone(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let router = build_router(AppState {
        assets: Arc::clone(&assets),
        config: Arc::clone(&config),
    });

    let supervisor = Supervisor::new(config.shutdown_timeout())
        .with(Component::database(
            db,
            Duration::from_secs(config.database.health_interval_secs),
        ))
        .with(Component::worker(consumer, assets))
        .with(Component::http(addr, router));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match supervisor.run(cancel).await? {
        StopReason::Cancelled => info!("Shutdown complete"),
        StopReason::Failed { component, error } => {
            anyhow::bail!("component {component} failed: {error}")
        }
        StopReason::Exited { component } => {
            anyhow::bail!("component {component} exited unexpectedly")
        }
    }
    Ok(())
}

async fn init_blob_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Filesystem => {
            let store = FilesystemBlobStore::new(config.path.clone(), config.max_blob_size)
                .await
                .context("Failed to initialize filesystem blob store")?;
            info!(path = %config.path.display(), "Using filesystem blob store");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => {
            let store =
                common::storage::object::ObjectBlobStore::new(&config.s3, config.max_blob_size)
                    .context("Failed to initialize S3 blob store")?;
            info!(bucket = %config.s3.bucket, "Using S3 blob store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "object-storage"))]
        StorageBackend::S3 => {
            anyhow::bail!("S3 storage requires the `object-storage` feature")
        }
    }
}

async fn init_broker(config: &MqAppConfig) -> anyhow::Result<Arc<dyn Broker>> {
    match config.backend {
        MqBackend::Redis => {
            let broker = RedisBroker::connect(MqConfig::from(config), config.queue_name.clone())
                .await
                .context("Failed to connect to message broker")?;
            Ok(Arc::new(broker))
        }
        MqBackend::Memory => {
            warn!("Using in-memory broker; queued tasks do not survive a restart");
            Ok(Arc::new(MemoryBroker::new(config.partitions)))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Received Ctrl+C, shutting down");
    cancel.cancel();
}
