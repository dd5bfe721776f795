use async_trait::async_trait;
use medscan_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use crate::{
    collector::UploadCollector,
    keys,
    models::{AnalysisResult, WorkflowStage},
    phase::PhaseTracker,
    render::ResultRenderer,
    tasks::CollectTask,
};

/// Displaying stage: holds the result until the user starts a new analysis.
pub struct DisplayTask {
    collector: Arc<UploadCollector>,
    phases: PhaseTracker,
}

impl DisplayTask {
    pub fn new(collector: Arc<UploadCollector>, phases: PhaseTracker) -> Self {
        Self { collector, phases }
    }
}

#[async_trait]
impl Task for DisplayTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        if context.flag(keys::NEW_ANALYSIS_REQUESTED).await {
            reset_cycle(&context, &self.collector, &self.phases).await?;
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::GoTo(std::any::type_name::<CollectTask>().to_string()),
                Some("Ready for a new prescription".to_string()),
            ));
        }

        let result: AnalysisResult = context
            .get(keys::RESULT)
            .await
            .ok_or_else(|| FlowError::ContextError("Analysis result not found in context".to_string()))?;

        context.set(keys::STAGE, WorkflowStage::Displaying).await?;
        let report = ResultRenderer::render(&result);

        Ok(TaskResult::new_with_status(
            Some(report.to_string()),
            NextAction::WaitForInput,
            Some(report.risk_badge),
        ))
    }
}

/// Drop everything the previous cycle produced and return to collecting.
pub(crate) async fn reset_cycle(
    context: &Context,
    collector: &UploadCollector,
    phases: &PhaseTracker,
) -> Result<()> {
    collector.clear(context).await;
    for key in [
        keys::REFERENCE,
        keys::RESULT,
        keys::SUBMIT_REQUESTED,
        keys::NEW_ANALYSIS_REQUESTED,
    ] {
        context.remove(key).await;
    }
    context.set(keys::STAGE, WorkflowStage::Collecting).await?;
    phases.reset();

    info!("Workflow reset for a new analysis");
    Ok(())
}
