use async_trait::async_trait;
use medscan_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    keys,
    models::{AnalysisResult, ImageReference, Notification, UploadedImage, WorkflowStage},
    orchestrator::AnalysisOrchestrator,
};

/// Analyzing stage. On failure the graph's fallback edge sends the session
/// back to collecting, with the selected image still in place.
pub struct AnalyzeTask {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl AnalyzeTask {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Task for AnalyzeTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let reference: ImageReference = context
            .get(keys::REFERENCE)
            .await
            .ok_or_else(|| FlowError::ContextError("Image reference not found in context".to_string()))?;
        let image: Option<UploadedImage> = context.get(keys::IMAGE).await;

        context.set(keys::STAGE, WorkflowStage::Analyzing).await?;
        context.remove(keys::RESULT).await;

        match self.orchestrator.analyze(&reference, image.as_ref()).await {
            Ok(result) => {
                context.set(keys::RESULT, &result).await?;
                context.set(keys::STAGE, WorkflowStage::Displaying).await?;
                keys::push_notification(&context, Notification::analysis_complete()).await?;
                info!("Analysis of {} complete", reference);
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some(summary_line(&result)),
                ))
            }
            Err(e) => {
                error!("Analysis of {} failed: {}", reference, e);
                context.remove(keys::REFERENCE).await;
                context.set(keys::STAGE, WorkflowStage::Collecting).await?;
                keys::push_notification(&context, e.notification()).await?;
                Err(FlowError::task(e))
            }
        }
    }
}

fn summary_line(result: &AnalysisResult) -> String {
    format!(
        "{} medicines, {} interactions, {}",
        result.medicines.len(),
        result.interactions.len(),
        result.overall_risk.badge()
    )
}
