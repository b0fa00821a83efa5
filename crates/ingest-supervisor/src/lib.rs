pub mod error;
pub mod health;
pub mod policy;
pub mod supervisor;

pub use error::SupervisorError;
pub use health::{TaskHealth, TaskState};
pub use policy::RestartPolicy;
pub use supervisor::{Supervisor, SupervisorHandle, TaskFactory, TaskFuture};
