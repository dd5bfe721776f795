use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Qualitative risk attached to an interaction or to the whole prescription.
///
/// Decoding is lenient: case is ignored, `moderate` reads as `Medium`,
/// `severe` as `High`, and anything else (including `null`) as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl From<Option<String>> for RiskLevel {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => RiskLevel::Low,
            Some("medium") | Some("moderate") => RiskLevel::Medium,
            Some("high") | Some("severe") => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }

    /// Badge text shown next to the overall assessment, e.g. `LOW RISK`.
    pub fn badge(&self) -> String {
        format!("{} RISK", self.label())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Medicine {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: None,
            frequency: None,
            duration: None,
            kind: None,
            instructions: None,
        }
    }
}

/// Decoding accepts either a `drugs` list or the `drug1`/`drug2` pair; null
/// entries and a null description read as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawInteraction")]
pub struct Interaction {
    pub drugs: Vec<String>,
    pub severity: RiskLevel,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInteraction {
    #[serde(default)]
    drugs: Option<Vec<Option<String>>>,
    #[serde(default)]
    drug1: Option<String>,
    #[serde(default)]
    drug2: Option<String>,
    #[serde(default)]
    severity: RiskLevel,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

impl From<RawInteraction> for Interaction {
    fn from(raw: RawInteraction) -> Self {
        let listed = raw.drugs.unwrap_or_default().into_iter().flatten();
        let mut drugs: Vec<String> = listed.filter(|d| !d.trim().is_empty()).collect();
        if drugs.is_empty() {
            drugs = [raw.drug1, raw.drug2]
                .into_iter()
                .flatten()
                .filter(|d| !d.trim().is_empty())
                .collect();
        }

        Self {
            drugs,
            severity: raw.severity,
            description: raw.description.unwrap_or_default(),
            recommendation: raw.recommendation,
        }
    }
}

/// Structured outcome of one analysis. Replaced wholesale by the next cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, alias = "extracted_text", skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub medicines: Vec<Medicine>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interactions: Vec<Interaction>,
    #[serde(default, deserialize_with = "strings_skipping_nulls")]
    pub recommendations: Vec<String>,
    #[serde(default, alias = "riskLevel")]
    pub overall_risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn strings_skipping_nulls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<Option<String>> = null_as_empty(deserializer)?;
    Ok(entries.into_iter().flatten().collect())
}

/// Local handle to the image the user picked. The bytes stay on disk until
/// the image is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
}

impl UploadedImage {
    pub fn new(path: impl Into<PathBuf>, media_type: impl Into<String>, size_bytes: u64) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Self {
            path,
            file_name,
            media_type: media_type.into(),
            size_bytes,
        }
    }

    /// Build a handle from a file on disk. The declared media type is guessed
    /// from the extension, the way a browser fills in `File.type`.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }

        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(path, media_type, metadata.len()))
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.size_bytes as f64 / 1024.0 / 1024.0)
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePreview {
    pub file_name: String,
    pub size_label: String,
    /// Width and height, when the image header could be decoded.
    pub dimensions: Option<(u32, u32)>,
}

impl fmt::Display for ImagePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_name, self.size_label)?;
        if let Some((width, height)) = self.dimensions {
            write!(f, " {}x{}", width, height)?;
        }
        Ok(())
    }
}

/// Opaque identifier for a stored image, handed unmodified to the analysis step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cosmetic progress marker shown while an analysis is running.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum WorkflowPhase {
    #[default]
    ProcessingImage,
    ExtractingText,
    AiAnalysis,
    GeneratingReport,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 4] = [
        WorkflowPhase::ProcessingImage,
        WorkflowPhase::ExtractingText,
        WorkflowPhase::AiAnalysis,
        WorkflowPhase::GeneratingReport,
    ];

    pub fn step(&self) -> u8 {
        match self {
            WorkflowPhase::ProcessingImage => 1,
            WorkflowPhase::ExtractingText => 2,
            WorkflowPhase::AiAnalysis => 3,
            WorkflowPhase::GeneratingReport => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowPhase::ProcessingImage => "Processing Image",
            WorkflowPhase::ExtractingText => "Extracting Text",
            WorkflowPhase::AiAnalysis => "AI Analysis",
            WorkflowPhase::GeneratingReport => "Generating Report",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorkflowPhase::ProcessingImage => "Analyzing uploaded prescription image",
            WorkflowPhase::ExtractingText => "Using OCR to extract text from image",
            WorkflowPhase::AiAnalysis => "Analyzing medicines and interactions",
            WorkflowPhase::GeneratingReport => "Preparing your analysis results",
        }
    }

    pub fn progress_percent(&self) -> u8 {
        (u16::from(self.step()) * 100 / Self::ALL.len() as u16) as u8
    }

    pub fn next(&self) -> Option<WorkflowPhase> {
        Self::ALL.get(self.step() as usize).copied()
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} ({}% Complete)",
            self.step(),
            Self::ALL.len(),
            self.name(),
            self.progress_percent()
        )
    }
}

/// Where the session stands from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStage {
    #[default]
    Collecting,
    Analyzing,
    Displaying,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStage::Collecting => "collecting",
            WorkflowStage::Analyzing => "analyzing",
            WorkflowStage::Displaying => "displaying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

/// User-facing toast raised at the workflow boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn analysis_complete() -> Self {
        Self::success(
            "Analysis Complete",
            "Your prescription has been successfully analyzed.",
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}
