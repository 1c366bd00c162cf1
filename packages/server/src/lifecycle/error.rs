use std::fmt;

use mq::MqError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("database: {0}")]
    Database(#[from] DbErr),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("broker: {0}")]
    Broker(#[from] MqError),
    #[error("shutdown deadline exceeded")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// One component that did not shut down cleanly.
#[derive(Debug)]
pub struct ShutdownFailure {
    /// Position in start order.
    pub index: usize,
    pub component: String,
    pub error: ComponentError,
}

/// All shutdown failures of one supervisor run.
#[derive(Debug)]
pub struct SupervisorError {
    pub failures: Vec<ShutdownFailure>,
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component(s) failed to shut down", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(
                f,
                "{sep}#{} {}: {}",
                failure.index, failure.component, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for SupervisorError {}
