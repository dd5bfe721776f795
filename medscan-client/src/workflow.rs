//! The prescription workflow: collect, analyze, display.
//!
//! The three stages are tasks of one `medscan_flow` graph. `ScanWorkflow` owns
//! a single session of that graph and exposes the user actions on it.

use medscan_flow::{
    Context, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::{
    api::{AnalysisClient, HttpAnalysisClient, HttpStorageClient, StorageClient, build_http_client},
    collector::UploadCollector,
    config::ClientConfig,
    error::{Result, ScanError},
    keys,
    models::{
        AnalysisResult, ImagePreview, ImageReference, Notification, UploadedImage, WorkflowStage,
    },
    orchestrator::AnalysisOrchestrator,
    phase::PhaseTracker,
    render::{RenderedReport, ResultRenderer},
    tasks::{AnalyzeTask, CollectTask, DisplayTask, display::reset_cycle},
};

pub const GRAPH_ID: &str = "prescription_workflow";

/// Collect -> Analyze -> Display, with analysis failures falling back to
/// collect.
pub fn build_prescription_workflow(
    collector: Arc<UploadCollector>,
    storage: Arc<dyn StorageClient>,
    orchestrator: Arc<AnalysisOrchestrator>,
    phases: PhaseTracker,
) -> Graph {
    let collect = Arc::new(CollectTask::new(collector.clone(), storage));
    let analyze = Arc::new(AnalyzeTask::new(orchestrator));
    let display = Arc::new(DisplayTask::new(collector, phases));

    let collect_id = collect.id().to_string();
    let analyze_id = analyze.id().to_string();
    let display_id = display.id().to_string();

    GraphBuilder::new(GRAPH_ID)
        .add_task(collect)
        .add_task(analyze)
        .add_task(display)
        .add_edge(collect_id.clone(), analyze_id.clone())
        .add_edge(analyze_id.clone(), display_id)
        .add_fallback_edge(analyze_id, collect_id.clone())
        .set_start_task(collect_id)
        .build()
}

/// A fresh session parked on the collect task.
pub async fn create_scan_session() -> Result<Session> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let session = Session::new_from_task(session_id, std::any::type_name::<CollectTask>())
        .with_graph_id(GRAPH_ID);
    session
        .context
        .set(keys::STAGE, WorkflowStage::Collecting)
        .await?;
    Ok(session)
}

pub fn create_flow_runner(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> FlowRunner {
    FlowRunner::new(graph, storage)
}

/// One user's prescription workflow.
///
/// At most one upload-and-analysis may be outstanding. Any other action
/// (`submit`, `new_analysis`, `select_image`, `clear_image`) while one is
/// running fails with `RequestInFlight`.
pub struct ScanWorkflow {
    runner: FlowRunner,
    sessions: Arc<dyn SessionStorage>,
    session_id: String,
    collector: Arc<UploadCollector>,
    phases: PhaseTracker,
    in_flight: AtomicBool,
}

impl ScanWorkflow {
    /// Workflow backed by the HTTP upload and analysis endpoints in `config`.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = build_http_client(config)?;
        let storage = Arc::new(HttpStorageClient::new(http.clone(), &config.upload_url));
        let analysis = Arc::new(HttpAnalysisClient::new(http, &config.analyze_url));
        Self::with_clients(storage, analysis, config).await
    }

    pub async fn with_clients(
        storage: Arc<dyn StorageClient>,
        analysis: Arc<dyn AnalysisClient>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let phases = PhaseTracker::new();
        let collector = Arc::new(UploadCollector::new(config.invalid_image_policy));
        let orchestrator = Arc::new(
            AnalysisOrchestrator::new(analysis, phases.clone())
                .with_pacing(config.phase_pacing())
                .with_inline_image(config.include_image_in_analysis),
        );

        let graph = Arc::new(build_prescription_workflow(
            collector.clone(),
            storage,
            orchestrator,
            phases.clone(),
        ));
        let sessions: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());

        let session = create_scan_session().await?;
        let session_id = session.id.clone();
        sessions.save(session).await?;
        info!("Started prescription session {}", session_id);

        Ok(Self {
            runner: create_flow_runner(graph, sessions.clone()),
            sessions,
            session_id,
            collector,
            phases,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Progress marker of the current (or last) analysis.
    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    /// Select an image. Non-image files leave the current selection as it is.
    pub async fn select_image(&self, image: UploadedImage) -> Result<Option<ImagePreview>> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let context = self.context().await?;
        match self.stage().await? {
            WorkflowStage::Collecting => {}
            WorkflowStage::Analyzing => return Err(ScanError::RequestInFlight),
            WorkflowStage::Displaying => return Err(ScanError::ResultDisplayed),
        }

        match self.collector.select_image(&context, image).await {
            Err(e @ ScanError::InvalidImageType { .. }) => {
                keys::push_notification(&context, e.notification()).await?;
                Err(e)
            }
            other => other,
        }
    }

    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<Option<ImagePreview>> {
        let image = UploadedImage::from_path(path).await?;
        self.select_image(image).await
    }

    pub async fn clear_image(&self) -> Result<()> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let context = self.context().await?;
        self.collector.clear(&context).await;
        Ok(())
    }

    /// Upload the selected image and analyze it. On success the workflow is
    /// left displaying the returned result.
    pub async fn submit(&self) -> Result<AnalysisResult> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let context = self.context().await?;

        if self.stage().await? == WorkflowStage::Displaying {
            return Err(ScanError::ResultDisplayed);
        }

        context.set(keys::SUBMIT_REQUESTED, true).await?;
        let outcome = self.runner.run(&self.session_id).await;
        context.remove(keys::SUBMIT_REQUESTED).await;

        if let Err(e) = outcome {
            let e = ScanError::from(e);
            warn!("Submission failed: {}", e);
            return Err(e);
        }

        context.get(keys::RESULT).await.ok_or(ScanError::NoResult)
    }

    /// Forget the image and result of the last cycle and go back to
    /// collecting.
    pub async fn new_analysis(&self) -> Result<()> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let context = self.context().await?;

        if self.stage().await? == WorkflowStage::Displaying {
            context.set(keys::NEW_ANALYSIS_REQUESTED, true).await?;
            self.runner.run(&self.session_id).await?;
        } else {
            reset_cycle(&context, &self.collector, &self.phases).await?;
        }
        Ok(())
    }

    pub async fn stage(&self) -> Result<WorkflowStage> {
        let context = self.context().await?;
        Ok(context.get(keys::STAGE).await.unwrap_or_default())
    }

    pub async fn current_image(&self) -> Result<Option<UploadedImage>> {
        let context = self.context().await?;
        Ok(self.collector.current_image(&context).await)
    }

    pub async fn preview(&self) -> Result<Option<ImagePreview>> {
        Ok(self.context().await?.get(keys::PREVIEW).await)
    }

    pub async fn reference(&self) -> Result<Option<ImageReference>> {
        Ok(self.context().await?.get(keys::REFERENCE).await)
    }

    pub async fn result(&self) -> Result<Option<AnalysisResult>> {
        Ok(self.context().await?.get(keys::RESULT).await)
    }

    /// The displayed result, rendered.
    pub async fn report(&self) -> Result<RenderedReport> {
        let result = self.result().await?.ok_or(ScanError::NoResult)?;
        Ok(ResultRenderer::render(&result))
    }

    /// Notifications raised since the last call, oldest first.
    pub async fn take_notifications(&self) -> Result<Vec<Notification>> {
        let context = self.context().await?;
        let pending = context.get(keys::NOTIFICATIONS).await.unwrap_or_default();
        context.remove(keys::NOTIFICATIONS).await;
        Ok(pending)
    }

    async fn context(&self) -> Result<Context> {
        let session = self
            .sessions
            .get(&self.session_id)
            .await?
            .ok_or_else(|| medscan_flow::FlowError::SessionNotFound(self.session_id.clone()))?;
        Ok(session.context)
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ScanError::RequestInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AnalyzeRequest;
    use crate::models::{Interaction, Medicine, NotificationKind, RiskLevel, WorkflowPhase};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeStorage {
        uploads: Mutex<Vec<(String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl StorageClient for FakeStorage {
        async fn upload(&self, image: &UploadedImage, bytes: Vec<u8>) -> Result<ImageReference> {
            self.uploads
                .lock()
                .unwrap()
                .push((image.file_name.clone(), bytes.len()));
            if self.fail {
                return Err(ScanError::UploadFailed("503 Service Unavailable".into()));
            }
            Ok(ImageReference::new(format!(
                "prescription_1700000000000_{}",
                image.file_name
            )))
        }
    }

    #[derive(Default)]
    struct FakeAnalysis {
        requests: Mutex<Vec<String>>,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    impl FakeAnalysis {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AnalysisClient for FakeAnalysis {
        async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult> {
            self.requests.lock().unwrap().push(request.blob_name.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(ScanError::AnalysisFailed("500 Internal Server Error".into()));
            }
            Ok(sample_result())
        }
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            extracted_text: Some("Rx: Amoxicillin 500mg, Ibuprofen 400mg, Omeprazole 20mg".into()),
            medicines: vec![
                Medicine::named("Amoxicillin"),
                Medicine::named("Ibuprofen"),
                Medicine::named("Omeprazole"),
            ],
            interactions: vec![Interaction {
                drugs: vec!["Ibuprofen".into(), "Omeprazole".into()],
                severity: RiskLevel::Low,
                description: "Omeprazole may reduce stomach irritation from Ibuprofen.".into(),
                recommendation: None,
            }],
            recommendations: vec!["Complete the full course of antibiotics".into()],
            overall_risk: RiskLevel::Low,
            summary: Some("Standard treatment with low interaction risk.".into()),
        }
    }

    fn test_config() -> ClientConfig {
        ClientConfig {
            phase_pacing_ms: 0,
            ..ClientConfig::default()
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![0xAB; len]).unwrap();
        path
    }

    async fn workflow(
        storage: Arc<FakeStorage>,
        analysis: Arc<FakeAnalysis>,
    ) -> ScanWorkflow {
        ScanWorkflow::with_clients(storage, analysis, &test_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn submit_uploads_once_and_passes_reference_through() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FakeStorage::default());
        let analysis = Arc::new(FakeAnalysis::default());
        let workflow = workflow(storage.clone(), analysis.clone()).await;

        workflow
            .select_path(write_file(&dir, "rx.jpg", 2 * 1024 * 1024))
            .await
            .unwrap();
        let result = workflow.submit().await.unwrap();

        assert_eq!(result.medicines.len(), 3);
        assert_eq!(
            *storage.uploads.lock().unwrap(),
            vec![("rx.jpg".to_string(), 2 * 1024 * 1024)]
        );
        assert_eq!(
            *analysis.requests.lock().unwrap(),
            vec!["prescription_1700000000000_rx.jpg".to_string()]
        );
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Displaying);
        assert_eq!(workflow.phases().current(), WorkflowPhase::GeneratingReport);
        assert_eq!(workflow.report().await.unwrap().risk_badge, "LOW RISK");

        let notifications = workflow.take_notifications().await.unwrap();
        assert_eq!(notifications, vec![Notification::analysis_complete()]);
        assert!(workflow.take_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn analysis_failure_returns_to_collecting_with_image_kept() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FakeStorage::default());
        let analysis = Arc::new(FakeAnalysis::failing(1));
        let workflow = workflow(storage.clone(), analysis.clone()).await;

        workflow
            .select_path(write_file(&dir, "rx.png", 1024))
            .await
            .unwrap();
        let err = workflow.submit().await.unwrap_err();

        assert!(matches!(err, ScanError::AnalysisFailed(_)));
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Collecting);
        assert!(workflow.current_image().await.unwrap().is_some());
        assert!(workflow.result().await.unwrap().is_none());
        assert!(workflow.reference().await.unwrap().is_none());

        let notifications = workflow.take_notifications().await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Error);
        assert_eq!(notifications[0].title, "Analysis Failed");

        // Retrying uploads again and succeeds.
        let result = workflow.submit().await.unwrap();
        assert_eq!(result.overall_risk, RiskLevel::Low);
        assert_eq!(storage.uploads.lock().unwrap().len(), 2);
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Displaying);
    }

    #[tokio::test]
    async fn upload_failure_skips_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FakeStorage {
            fail: true,
            ..FakeStorage::default()
        });
        let analysis = Arc::new(FakeAnalysis::default());
        let workflow = workflow(storage, analysis.clone()).await;

        workflow
            .select_path(write_file(&dir, "rx.jpg", 512))
            .await
            .unwrap();
        let err = workflow.submit().await.unwrap_err();

        assert!(matches!(err, ScanError::UploadFailed(_)));
        assert!(analysis.requests.lock().unwrap().is_empty());
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Collecting);
        assert!(workflow.current_image().await.unwrap().is_some());
        let notifications = workflow.take_notifications().await.unwrap();
        assert_eq!(notifications[0].title, "Upload Failed");
    }

    #[tokio::test]
    async fn submit_without_image_is_rejected() {
        let workflow = workflow(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeAnalysis::default()),
        )
        .await;

        let err = workflow.submit().await.unwrap_err();

        assert!(matches!(err, ScanError::NoImageSelected));
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Collecting);
    }

    #[tokio::test]
    async fn non_image_selection_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeAnalysis::default()),
        )
        .await;

        workflow
            .select_path(write_file(&dir, "rx.jpg", 256))
            .await
            .unwrap();
        let before = workflow.current_image().await.unwrap();

        let err = workflow
            .select_path(write_file(&dir, "rx.pdf", 256))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::InvalidImageType { .. }));
        assert_eq!(workflow.current_image().await.unwrap(), before);
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Collecting);
        let notifications = workflow.take_notifications().await.unwrap();
        assert_eq!(notifications[0].title, "Unsupported File");
    }

    #[tokio::test]
    async fn new_analysis_resets_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeAnalysis::default()),
        )
        .await;

        workflow
            .select_path(write_file(&dir, "rx.jpg", 256))
            .await
            .unwrap();
        workflow.submit().await.unwrap();
        assert!(matches!(
            workflow.submit().await.unwrap_err(),
            ScanError::ResultDisplayed
        ));

        workflow.new_analysis().await.unwrap();

        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Collecting);
        assert!(workflow.current_image().await.unwrap().is_none());
        assert!(workflow.preview().await.unwrap().is_none());
        assert!(workflow.reference().await.unwrap().is_none());
        assert!(workflow.result().await.unwrap().is_none());
        assert_eq!(workflow.phases().current(), WorkflowPhase::ProcessingImage);

        // The next cycle runs end to end again.
        workflow
            .select_path(write_file(&dir, "second.png", 256))
            .await
            .unwrap();
        workflow.submit().await.unwrap();
        assert_eq!(workflow.stage().await.unwrap(), WorkflowStage::Displaying);
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FakeStorage::default());
        let analysis = Arc::new(FakeAnalysis {
            delay: Duration::from_millis(100),
            ..FakeAnalysis::default()
        });
        let workflow = workflow(storage.clone(), analysis).await;
        workflow
            .select_path(write_file(&dir, "rx.jpg", 256))
            .await
            .unwrap();

        let (first, second) = tokio::join!(workflow.submit(), workflow.submit());

        assert!(first.is_ok());
        assert!(matches!(second.unwrap_err(), ScanError::RequestInFlight));
        assert_eq!(storage.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn selection_is_locked_while_analysis_runs() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = Arc::new(FakeAnalysis {
            delay: Duration::from_millis(100),
            ..FakeAnalysis::default()
        });
        let workflow = workflow(Arc::new(FakeStorage::default()), analysis).await;
        let first = write_file(&dir, "rx.jpg", 256);
        let other = UploadedImage::from_path(write_file(&dir, "other.png", 256))
            .await
            .unwrap();
        workflow.select_path(&first).await.unwrap();

        let (submitted, cleared, reselected) = tokio::join!(
            workflow.submit(),
            workflow.clear_image(),
            workflow.select_image(other)
        );

        assert!(submitted.is_ok());
        assert!(matches!(cleared.unwrap_err(), ScanError::RequestInFlight));
        assert!(matches!(reselected.unwrap_err(), ScanError::RequestInFlight));
        let image = workflow.current_image().await.unwrap().unwrap();
        assert_eq!(image.file_name, "rx.jpg");
    }
}
