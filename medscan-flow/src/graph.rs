use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    context::Context,
    error::{FlowError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Edge between tasks in the graph
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<EdgeCondition>,
}

/// A graph of tasks. Built once with [`GraphBuilder`] and then shared read-only.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    fallbacks: HashMap<String, String>,
    start_task_id: Option<String>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            fallbacks: HashMap::new(),
            start_task_id: None,
        }
    }

    /// Run the session's current task and move the session along the graph.
    ///
    /// `ContinueAndExecute` chains are followed within the same call. When a
    /// task fails the session is moved to that task's fallback target, if one
    /// was registered, and the error is returned either way.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let task_id = session.current_task_id.clone();

        let result = match self.execute_single_task(&task_id, session.context.clone()).await {
            Ok(result) => result,
            Err(e) => {
                if let Some(target) = self.fallbacks.get(&task_id) {
                    warn!("Task {} failed, falling back to {}: {}", task_id, target, e);
                    session.current_task_id = target.clone();
                }
                session.status_message = Some(e.to_string());
                return Err(e);
            }
        };

        session.status_message = result.status_message.clone();

        match &result.next_action {
            NextAction::Continue => {
                if let Some(next_task_id) = self.find_next_task(&result.task_id, &session.context) {
                    session.current_task_id = next_task_id;
                }
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::WaitingForInput,
                })
            }
            NextAction::ContinueAndExecute => {
                match self.find_next_task(&result.task_id, &session.context) {
                    Some(next_task_id) => {
                        debug!("{} -> {}", result.task_id, next_task_id);
                        session.current_task_id = next_task_id;
                        Box::pin(self.execute_session(session)).await
                    }
                    None => Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::WaitingForInput,
                    }),
                }
            }
            NextAction::GoTo(target_id) => {
                if !self.tasks.contains_key(target_id) {
                    return Err(FlowError::TaskNotFound(target_id.clone()));
                }
                session.current_task_id = target_id.clone();
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::WaitingForInput,
                })
            }
            NextAction::WaitForInput => Ok(ExecutionResult {
                response: result.response,
                status: ExecutionStatus::WaitingForInput,
            }),
            NextAction::End => Ok(ExecutionResult {
                response: result.response,
                status: ExecutionStatus::Completed,
            }),
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Find the next task based on edges and conditions. Edges are tried in the
    /// order they were added; the first unconditional or satisfied edge wins.
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        self.edges
            .iter()
            .filter(|edge| edge.from == current_task_id)
            .find(|edge| edge.condition.as_ref().is_none_or(|condition| condition(context)))
            .map(|edge| edge.to.clone())
    }

    pub fn fallback_for(&self, task_id: &str) -> Option<&str> {
        self.fallbacks.get(task_id).map(String::as_str)
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task. The first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.start_task_id.is_none() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: None,
        });
        self
    }

    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: F,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: Some(Arc::new(condition)),
        });
        self
    }

    /// Route the session to `to` whenever `from` fails.
    pub fn add_fallback_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.fallbacks.insert(from.into(), to.into());
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Status of graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Waiting for more input before the session can move on
    WaitingForInput,
    /// Workflow completed successfully
    Completed,
}
