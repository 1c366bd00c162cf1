mod component;
mod error;
mod supervisor;

pub use component::{
    Component, DatabaseComponent, FunctionalComponent, HttpComponent, WorkerComponent,
};
pub use error::{ComponentError, ShutdownFailure, SupervisorError};
pub use supervisor::{StopReason, Supervisor};
