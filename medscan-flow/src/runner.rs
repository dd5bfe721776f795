//! `FlowRunner` wraps the load, execute, save round trip for one session step.
//!
//! A step runs the session's current task and any `ContinueAndExecute` chain
//! after it. The session is written back even when the step fails, so a
//! fallback edge taken on failure is what the next step starts from.

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::{FlowError, Result},
    graph::{ExecutionResult, Graph},
    storage::SessionStorage,
};

#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Execute one step for `session_id` and persist the updated session.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        debug!(
            "Running session {} at task {}",
            session_id, session.current_task_id
        );
        let outcome = self.graph.execute_session(&mut session).await;

        self.storage.save(session).await?;

        outcome
    }
}
