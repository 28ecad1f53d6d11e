//! The durable task scheduler (§4.4) and managed service lifecycle (§4.5).

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod outcome;
pub mod registry;
pub mod worker;

pub use context::TaskContext;
pub use error::SchedulerError;
pub use lifecycle::{ServiceLifecycle, ServiceState, ServiceStateChanged};
pub use outcome::{Outcome, TaskError};
pub use registry::{TaskHandler, TaskTypeRegistry};
pub use worker::{WorkerPool, WorkerPoolConfig};
