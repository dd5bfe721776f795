use medscan_flow::FlowError;
use thiserror::Error;

use crate::models::Notification;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unsupported file type '{media_type}': please select an image")]
    InvalidImageType { media_type: String },

    #[error("No prescription image selected")]
    NoImageSelected,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("An upload or analysis is already in progress")]
    RequestInFlight,

    #[error("Nothing to show: no analysis result is available")]
    NoResult,

    #[error("A result is on display; start a new analysis first")]
    ResultDisplayed,

    #[error("Report export failed: {0}")]
    ExportFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Flow(FlowError),
}

impl From<FlowError> for ScanError {
    /// Task failures carry the original `ScanError`; unwrap it so callers can
    /// match on the kind instead of on the engine error.
    fn from(error: FlowError) -> Self {
        match error {
            FlowError::TaskExecutionFailed(source) => match source.downcast::<ScanError>() {
                Ok(scan_error) => scan_error,
                Err(other) => ScanError::Flow(FlowError::TaskExecutionFailed(other)),
            },
            other => ScanError::Flow(other),
        }
    }
}

impl ScanError {
    /// The toast shown to the user for this error.
    pub fn notification(&self) -> Notification {
        match self {
            ScanError::InvalidImageType { .. } => Notification::error(
                "Unsupported File",
                "Please select an image file (JPEG, PNG, HEIC, ...).",
            ),
            ScanError::NoImageSelected => {
                Notification::error("No Image Selected", "Please select a file.")
            }
            ScanError::UploadFailed(_) => {
                Notification::error("Upload Failed", "Upload failed. Please try again.")
            }
            ScanError::AnalysisFailed(_) => Notification::error(
                "Analysis Failed",
                "There was an error analyzing your prescription. Please try again.",
            ),
            ScanError::RequestInFlight => Notification::error(
                "Please Wait",
                "Your prescription is still being analyzed.",
            ),
            other => Notification::error("Something Went Wrong", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    #[test]
    fn task_failure_unwraps_to_scan_error() {
        let flow = FlowError::task(ScanError::AnalysisFailed("connection refused".into()));
        let scan: ScanError = flow.into();
        assert!(matches!(scan, ScanError::AnalysisFailed(msg) if msg == "connection refused"));
    }

    #[test]
    fn foreign_task_failure_stays_a_flow_error() {
        let flow = FlowError::task(anyhow::anyhow!("boom"));
        let scan: ScanError = flow.into();
        assert!(matches!(scan, ScanError::Flow(FlowError::TaskExecutionFailed(_))));

        let scan: ScanError = FlowError::SessionNotFound("s".into()).into();
        assert!(matches!(scan, ScanError::Flow(FlowError::SessionNotFound(_))));
    }

    #[test]
    fn notifications_use_toast_wording() {
        let toast = ScanError::AnalysisFailed("timeout".into()).notification();
        assert_eq!(toast.kind, NotificationKind::Error);
        assert_eq!(toast.title, "Analysis Failed");

        let toast = ScanError::UploadFailed("500".into()).notification();
        assert_eq!(toast.description, "Upload failed. Please try again.");
    }
}
