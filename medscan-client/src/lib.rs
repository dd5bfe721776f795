pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod export;
pub mod keys;
pub mod models;
pub mod orchestrator;
pub mod phase;
pub mod render;
pub mod tasks;
pub mod workflow;

pub use api::{AnalysisClient, AnalyzeRequest, HttpAnalysisClient, HttpStorageClient, StorageClient};
pub use config::{ClientConfig, InvalidImagePolicy};
pub use error::{Result, ScanError};
pub use export::{ExportedReport, ReportFields, export_report};
pub use models::*;
pub use phase::PhaseTracker;
pub use render::{RenderedReport, ResultRenderer};
pub use workflow::{
    ScanWorkflow, build_prescription_workflow, create_flow_runner, create_scan_session,
};
