//! HTTP collaborators: the storage endpoint that takes the image and the
//! analysis endpoint that turns a reference into an [`AnalysisResult`].

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::ClientConfig,
    error::{Result, ScanError},
    models::{AnalysisResult, ImageReference, UploadedImage},
};

/// Stores an image and hands back an opaque reference to it.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn upload(&self, image: &UploadedImage, bytes: Vec<u8>) -> Result<ImageReference>;
}

/// Runs the remote OCR and AI analysis for a stored image.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult>;
}

/// Body of the analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub blob_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(reference: &ImageReference) -> Self {
        Self {
            blob_name: reference.as_str().to_string(),
            image_base64: None,
            media_type: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    blob_name: Option<String>,
    url: Option<String>,
}

pub fn build_http_client(config: &ClientConfig) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ScanError::Config(format!("Failed to create HTTP client: {}", e)))
}

pub struct HttpStorageClient {
    client: Client,
    upload_url: String,
}

impl HttpStorageClient {
    pub fn new(client: Client, upload_url: impl Into<String>) -> Self {
        Self {
            client,
            upload_url: upload_url.into(),
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn upload(&self, image: &UploadedImage, bytes: Vec<u8>) -> Result<ImageReference> {
        info!(
            "Uploading {} ({}) to {}",
            image.file_name,
            image.size_label(),
            self.upload_url
        );

        let part = Part::bytes(bytes)
            .file_name(image.file_name.clone())
            .mime_str(&image.media_type)
            .map_err(|e| {
                ScanError::UploadFailed(format!("invalid media type {}: {}", image.media_type, e))
            })?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ScanError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::UploadFailed(format!(
                "storage service returned {}: {}",
                status,
                body.trim()
            )));
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ScanError::UploadFailed(format!("unreadable upload response: {}", e)))?;

        let reference = payload
            .blob_name
            .or(payload.url)
            .filter(|reference| !reference.trim().is_empty())
            .map(ImageReference::new)
            .ok_or_else(|| {
                ScanError::UploadFailed("upload response did not name the stored image".to_string())
            })?;

        info!("Uploaded to: {}", reference);
        Ok(reference)
    }
}

pub struct HttpAnalysisClient {
    client: Client,
    analyze_url: String,
}

impl HttpAnalysisClient {
    pub fn new(client: Client, analyze_url: impl Into<String>) -> Self {
        Self {
            client,
            analyze_url: analyze_url.into(),
        }
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult> {
        info!("Requesting analysis of {}", request.blob_name);

        let response = self
            .client
            .post(&self.analyze_url)
            .json(request)
            .send()
            .await
            .map_err(|e| ScanError::AnalysisFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ScanError::AnalysisFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(ScanError::AnalysisFailed(format!(
                "analysis service returned {}: {}",
                status,
                body.trim()
            )));
        }

        debug!("Analysis response: {} bytes", body.len());
        decode_analysis(&body)
    }
}

/// Decode an analysis response.
///
/// Accepts a bare result document, or the storage backend's envelope
/// `{id, blob_name, extracted_text, ai_analysis, analyzed_at}` where
/// `ai_analysis` holds the model's JSON answer as a string.
pub fn decode_analysis(body: &str) -> Result<AnalysisResult> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ScanError::AnalysisFailed(format!("malformed response: {}", e)))?;

    let mut result: AnalysisResult = match value.get("ai_analysis") {
        Some(Value::String(raw)) => serde_json::from_str(strip_code_fence(raw)),
        Some(inner @ Value::Object(_)) => serde_json::from_value(inner.clone()),
        _ => serde_json::from_value(value.clone()),
    }
    .map_err(|e| ScanError::AnalysisFailed(format!("malformed analysis result: {}", e)))?;

    let missing_text = result
        .extracted_text
        .as_deref()
        .is_none_or(|text| text.trim().is_empty());
    if missing_text {
        if let Some(text) = value.get("extracted_text").and_then(Value::as_str) {
            result.extracted_text = Some(text.to_string());
        }
    }

    Ok(result)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use serde_json::json;

    #[test]
    fn decodes_bare_result() {
        let body = json!({
            "extractedText": "Rx: Omeprazole 20mg",
            "medicines": [{ "name": "Omeprazole", "dosage": "20mg" }],
            "overallRisk": "low",
            "summary": "Standard treatment."
        })
        .to_string();

        let result = decode_analysis(&body).unwrap();
        assert_eq!(result.medicines.len(), 1);
        assert_eq!(result.overall_risk, RiskLevel::Low);
        assert_eq!(result.extracted_text.as_deref(), Some("Rx: Omeprazole 20mg"));
    }

    #[test]
    fn decodes_backend_envelope_with_fenced_answer() {
        let answer = "```json\n{\"riskLevel\": \"HIGH\", \"medicines\": [{\"name\": \"Warfarin\"}]}\n```";
        let body = json!({
            "id": "3f1c",
            "blob_name": "prescription_1700000000000_rx.jpg",
            "extracted_text": "Warfarin 5mg daily",
            "ai_analysis": answer,
            "analyzed_at": "2024-01-01T00:00:00"
        })
        .to_string();

        let result = decode_analysis(&body).unwrap();
        assert_eq!(result.overall_risk, RiskLevel::High);
        assert_eq!(result.medicines[0].name, "Warfarin");
        assert_eq!(result.extracted_text.as_deref(), Some("Warfarin 5mg daily"));
    }

    #[test]
    fn backend_interaction_pairs_render_as_titles() {
        let answer = json!({
            "riskLevel": "HIGH",
            "interactions": [{
                "drug1": "Warfarin",
                "drug2": "Aspirin",
                "severity": "HIGH",
                "description": "Raised bleeding risk.",
                "recommendation": null
            }]
        })
        .to_string();
        let body = json!({ "blob_name": "prescription_1_rx.jpg", "ai_analysis": answer }).to_string();

        let result = decode_analysis(&body).unwrap();
        assert_eq!(result.interactions[0].drugs, vec!["Warfarin".to_string(), "Aspirin".to_string()]);

        let report = crate::render::ResultRenderer::render(&result);
        assert_eq!(report.interactions[0].title, "Warfarin + Aspirin");
        assert_eq!(report.interactions[0].severity, RiskLevel::High.label());
    }

    #[test]
    fn null_interaction_description_still_decodes() {
        let body = json!({
            "interactions": [{ "drugs": ["A", "B"], "severity": "low", "description": null }]
        })
        .to_string();

        let result = decode_analysis(&body).unwrap();
        assert_eq!(result.interactions[0].description, "");
        let report = crate::render::ResultRenderer::render(&result);
        assert_eq!(report.interactions[0].title, "A + B");
    }

    #[test]
    fn inner_extracted_text_wins_over_envelope() {
        let body = json!({
            "extracted_text": "raw OCR",
            "ai_analysis": { "extractedText": "cleaned OCR" }
        })
        .to_string();

        let result = decode_analysis(&body).unwrap();
        assert_eq!(result.extracted_text.as_deref(), Some("cleaned OCR"));
    }

    #[test]
    fn malformed_payloads_are_analysis_failures() {
        for body in ["not json", "{\"ai_analysis\": \"I could not read this image\"}", "[1, 2]"] {
            let err = decode_analysis(body).unwrap_err();
            assert!(matches!(err, ScanError::AnalysisFailed(_)), "body: {}", body);
        }
    }

    #[test]
    fn analyze_request_omits_absent_image() {
        let request = AnalyzeRequest::new(&ImageReference::new("prescription_1_rx.jpg"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "blob_name": "prescription_1_rx.jpg" })
        );
    }

    #[test]
    fn strips_plain_code_fence() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }
}
