pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

pub use context::Context;
pub use error::{FlowError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};
