use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::{
    api::{AnalysisClient, AnalyzeRequest},
    error::{Result, ScanError},
    models::{AnalysisResult, ImageReference, UploadedImage, WorkflowPhase},
    phase::PhaseTracker,
};

/// Runs one remote analysis per call and moves the progress marker along:
/// phase 1 and 4 are paced cosmetically, phase 2 and 3 bracket the request.
pub struct AnalysisOrchestrator {
    client: Arc<dyn AnalysisClient>,
    phases: PhaseTracker,
    pacing: Duration,
    include_image: bool,
}

impl AnalysisOrchestrator {
    pub fn new(client: Arc<dyn AnalysisClient>, phases: PhaseTracker) -> Self {
        Self {
            client,
            phases,
            pacing: Duration::ZERO,
            include_image: false,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Send the image bytes inline alongside the reference.
    pub fn with_inline_image(mut self, include_image: bool) -> Self {
        self.include_image = include_image;
        self
    }

    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    /// Analyze the image stored under `reference`. No retry: any failure is
    /// returned as `AnalysisFailed` and the marker stays where it got to.
    pub async fn analyze(
        &self,
        reference: &ImageReference,
        image: Option<&UploadedImage>,
    ) -> Result<AnalysisResult> {
        self.phases.reset();
        info!("Analyzing {}", reference);
        self.pause().await;

        let request = self.build_request(reference, image).await?;

        self.phases.advance_to(WorkflowPhase::ExtractingText);
        let result = self.client.analyze(&request).await.map_err(|e| {
            error!("Analysis error: {}", e);
            match e {
                ScanError::AnalysisFailed(_) => e,
                other => ScanError::AnalysisFailed(other.to_string()),
            }
        })?;
        self.phases.advance_to(WorkflowPhase::AiAnalysis);

        self.pause().await;
        self.phases.advance_to(WorkflowPhase::GeneratingReport);

        info!(
            "Analysis of {} returned {} medicines, {} interactions, risk {}",
            reference,
            result.medicines.len(),
            result.interactions.len(),
            result.overall_risk
        );
        Ok(result)
    }

    async fn build_request(
        &self,
        reference: &ImageReference,
        image: Option<&UploadedImage>,
    ) -> Result<AnalyzeRequest> {
        let mut request = AnalyzeRequest::new(reference);

        if let (true, Some(image)) = (self.include_image, image) {
            let bytes = image.read_bytes().await.map_err(|e| {
                ScanError::AnalysisFailed(format!("cannot read {}: {}", image.path.display(), e))
            })?;
            request.image_base64 = Some(STANDARD.encode(&bytes));
            request.media_type = Some(image.media_type.clone());
        }

        Ok(request)
    }

    async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }
}
