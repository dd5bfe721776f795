use async_trait::async_trait;
use medscan_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use crate::{api::StorageClient, collector::UploadCollector, keys, models::WorkflowStage};

/// Collecting stage: waits until the user submits, then uploads the image.
pub struct CollectTask {
    collector: Arc<UploadCollector>,
    storage: Arc<dyn StorageClient>,
}

impl CollectTask {
    pub fn new(collector: Arc<UploadCollector>, storage: Arc<dyn StorageClient>) -> Self {
        Self { collector, storage }
    }
}

#[async_trait]
impl Task for CollectTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        if !context.flag(keys::SUBMIT_REQUESTED).await {
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::WaitForInput,
                Some("Waiting for a prescription image".to_string()),
            ));
        }

        context.set(keys::SUBMIT_REQUESTED, false).await?;
        context.set(keys::STAGE, WorkflowStage::Collecting).await?;

        match self.collector.submit(&context, self.storage.as_ref()).await {
            Ok(reference) => {
                info!("Image stored as {}, starting analysis", reference);
                context.set(keys::STAGE, WorkflowStage::Analyzing).await?;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some(format!("Uploaded as {}", reference)),
                ))
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                keys::push_notification(&context, e.notification()).await?;
                Err(FlowError::task(e))
            }
        }
    }
}
