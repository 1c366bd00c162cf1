use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::future::BoxFuture;
use mq::Consumer;
use sea_orm::DatabaseConnection;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::error::ComponentError;
use crate::assets::AssetService;
use crate::worker::run_worker;

type RunFn = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), ComponentError>> + Send + Sync>;
type ShutdownFn = Box<dyn Fn(Instant) -> BoxFuture<'static, Result<(), ComponentError>> + Send + Sync>;

/// Long-lived part of the process, run and stopped by the supervisor.
pub enum Component {
    Database(DatabaseComponent),
    Http(HttpComponent),
    Worker(WorkerComponent),
    Functional(FunctionalComponent),
}

impl Component {
    pub fn database(db: DatabaseConnection, health_interval: Duration) -> Self {
        Self::Database(DatabaseComponent { db, health_interval })
    }

    pub fn http(addr: SocketAddr, router: Router) -> Self {
        Self::Http(HttpComponent {
            addr,
            router,
            done: CancellationToken::new(),
        })
    }

    pub fn worker(consumer: Consumer, assets: Arc<AssetService>) -> Self {
        Self::Worker(WorkerComponent {
            consumer,
            assets,
            done: CancellationToken::new(),
        })
    }

    /// Component from a pair of closures.
    pub fn functional<R, RF, S, SF>(name: impl Into<String>, run: R, shutdown: S) -> Self
    where
        R: Fn(CancellationToken) -> RF + Send + Sync + 'static,
        RF: Future<Output = Result<(), ComponentError>> + Send + 'static,
        S: Fn(Instant) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        Self::Functional(FunctionalComponent {
            name: name.into(),
            run: Box::new(move |cancel| Box::pin(run(cancel))),
            shutdown: Box::new(move |deadline| Box::pin(shutdown(deadline))),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Database(_) => "database",
            Self::Http(_) => "http",
            Self::Worker(_) => "worker",
            Self::Functional(c) => &c.name,
        }
    }

    /// Run until `cancel` fires or the component fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        match self {
            Self::Database(c) => c.run(cancel).await,
            Self::Http(c) => c.run(cancel).await,
            Self::Worker(c) => c.run(cancel).await,
            Self::Functional(c) => (c.run)(cancel).await,
        }
    }

    /// Release resources. Called after `run`'s cancellation token fired.
    pub async fn shutdown(&self, deadline: Instant) -> Result<(), ComponentError> {
        match self {
            Self::Database(c) => c.shutdown().await,
            Self::Http(c) => wait_done(&c.done, deadline).await,
            Self::Worker(c) => wait_done(&c.done, deadline).await,
            Self::Functional(c) => (c.shutdown)(deadline).await,
        }
    }
}

async fn wait_done(done: &CancellationToken, deadline: Instant) -> Result<(), ComponentError> {
    tokio::time::timeout_at(deadline, done.cancelled())
        .await
        .map_err(|_| ComponentError::Timeout)
}

/// Pings the shared pool; fails when the database stops answering.
pub struct DatabaseComponent {
    db: DatabaseConnection,
    health_interval: Duration,
}

impl DatabaseComponent {
    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        let mut ticker = tokio::time::interval(self.health_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Database component stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.db.ping().await {
                        error!(error = %e, "Database ping failed");
                        return Err(e.into());
                    }
                }
            }
        }
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.db.clone().close().await?;
        info!("Database connection closed");
        Ok(())
    }
}

/// Serves the HTTP router with graceful shutdown.
pub struct HttpComponent {
    addr: SocketAddr,
    router: Router,
    done: CancellationToken,
}

impl HttpComponent {
    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        let _done = self.done.clone().drop_guard();

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Server running at http://{}", self.addr);

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Feeds queued tasks to the asset service.
pub struct WorkerComponent {
    consumer: Consumer,
    assets: Arc<AssetService>,
    done: CancellationToken,
}

impl WorkerComponent {
    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        let _done = self.done.clone().drop_guard();
        run_worker(&self.consumer, Arc::clone(&self.assets), cancel).await?;
        Ok(())
    }
}

pub struct FunctionalComponent {
    name: String,
    run: RunFn,
    shutdown: ShutdownFn,
}
