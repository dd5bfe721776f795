//! Client-side report export. Nothing here touches the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{
    error::{Result, ScanError},
    models::{AnalysisResult, Interaction, Medicine},
};

/// Which parts of the result go into the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFields {
    pub extracted_text: bool,
    pub medicines: bool,
    pub interactions: bool,
    pub recommendations: bool,
}

impl ReportFields {
    pub fn all() -> Self {
        Self {
            extracted_text: true,
            medicines: true,
            interactions: true,
            recommendations: true,
        }
    }

    pub fn none() -> Self {
        Self {
            extracted_text: false,
            medicines: false,
            interactions: false,
            recommendations: false,
        }
    }
}

impl Default for ReportFields {
    fn default() -> Self {
        Self::all()
    }
}

/// The downloadable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedReport {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medicines: Option<Vec<Medicine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<Vec<Interaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
}

pub fn build_report(
    result: &AnalysisResult,
    fields: ReportFields,
    timestamp: DateTime<Utc>,
) -> ExportedReport {
    ExportedReport {
        timestamp,
        extracted_text: if fields.extracted_text {
            result.extracted_text.clone()
        } else {
            None
        },
        medicines: fields.medicines.then(|| result.medicines.clone()),
        interactions: fields.interactions.then(|| result.interactions.clone()),
        recommendations: fields.recommendations.then(|| result.recommendations.clone()),
    }
}

/// `prescription-analysis-<unix millis>.json`
pub fn report_file_name(timestamp: DateTime<Utc>) -> String {
    format!("prescription-analysis-{}.json", timestamp.timestamp_millis())
}

pub fn to_json(report: &ExportedReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(|e| ScanError::ExportFailed(e.to_string()))
}

pub fn parse_report(json: &str) -> Result<ExportedReport> {
    serde_json::from_str(json).map_err(|e| ScanError::ExportFailed(e.to_string()))
}

/// Write the selected fields of `result` into `dir` and return the file path.
pub async fn export_report(
    result: &AnalysisResult,
    fields: ReportFields,
    dir: &Path,
) -> Result<PathBuf> {
    let timestamp = Utc::now();
    let report = build_report(result, fields, timestamp);
    let json = to_json(&report)?;

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        ScanError::ExportFailed(format!("cannot create {}: {}", dir.display(), e))
    })?;
    let path = dir.join(report_file_name(timestamp));
    tokio::fs::write(&path, json).await.map_err(|e| {
        ScanError::ExportFailed(format!("cannot write {}: {}", path.display(), e))
    })?;

    info!("Report exported to {}", path.display());
    Ok(path)
}
