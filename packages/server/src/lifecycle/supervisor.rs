use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::component::Component;
use super::error::{ComponentError, ShutdownFailure, SupervisorError};

/// Why the supervised set stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The external cancellation token fired.
    Cancelled,
    /// A component returned an error.
    Failed { component: String, error: String },
    /// A component returned without being asked to.
    Exited { component: String },
}

/// Runs components concurrently and tears them down as one unit.
///
/// Shutdown goes in reverse start order against one deadline shared by the
/// whole sequence. Every component gets a shutdown attempt, even after an
/// earlier one failed or the budget ran out.
pub struct Supervisor {
    components: Vec<Arc<Component>>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            components: Vec::new(),
            shutdown_timeout,
        }
    }

    /// Append a component; start order is insertion order.
    pub fn with(mut self, component: Component) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<StopReason, SupervisorError> {
        let mut tasks = JoinSet::new();
        for (index, component) in self.components.iter().enumerate() {
            let component = Arc::clone(component);
            let token = cancel.clone();
            info!(index, component = component.name(), "Starting component");
            tasks.spawn(async move {
                let result = component.run(token).await;
                (index, result)
            });
        }

        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Supervisor received a terminate signal");
                StopReason::Cancelled
            }
            Some(joined) = tasks.join_next() => self.describe_exit(joined),
        };
        cancel.cancel();

        info!(
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            "Supervisor shutting down"
        );
        let deadline = Instant::now() + self.shutdown_timeout;
        let result = self.shutdown(deadline).await;

        // Give run tasks whatever is left of the budget to observe cancellation.
        while let Ok(Some(joined)) = tokio::time::timeout_at(deadline, tasks.join_next()).await {
            if let Ok((index, Err(e))) = joined {
                debug!(index, error = %e, "Component run ended with error during shutdown");
            }
        }
        tasks.abort_all();

        result.map(|()| reason)
    }

    fn describe_exit(
        &self,
        joined: Result<(usize, Result<(), ComponentError>), JoinError>,
    ) -> StopReason {
        match joined {
            Ok((index, Ok(()))) => {
                let component = self.components[index].name().to_string();
                warn!(index, component = %component, "Component exited");
                StopReason::Exited { component }
            }
            Ok((index, Err(e))) => {
                let component = self.components[index].name().to_string();
                error!(index, component = %component, error = %e, "Component failed");
                StopReason::Failed {
                    component,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Component task panicked");
                StopReason::Failed {
                    component: "unknown".into(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), SupervisorError> {
        let mut failures = Vec::new();
        for (index, component) in self.components.iter().enumerate().rev() {
            info!(index, component = component.name(), "Shutting down component");
            let outcome = tokio::time::timeout_at(deadline, component.shutdown(deadline)).await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(_) => ComponentError::Timeout,
            };
            failures.push(ShutdownFailure {
                index,
                component: component.name().to_string(),
                error,
            });
        }

        if failures.is_empty() {
            info!("Supervisor shut down cleanly");
            Ok(())
        } else {
            let err = SupervisorError { failures };
            error!(errors = %err, "Supervisor shut down with errors");
            Err(err)
        }
    }
}
