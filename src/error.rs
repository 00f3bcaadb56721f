use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::detection::DetectionStatus;

/// Rejections and failures raised by the detection workflow.
///
/// Every variant is recoverable: the session stays usable after any of them.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum DetectionError {
    #[error("no image selected")]
    NoImageSelected,

    #[error("an analysis is already in progress")]
    DuplicateAnalysis,

    #[error("analysis already complete; select a new image to analyze again")]
    AnalysisAlreadyComplete,

    #[error("classifier failed: {0}")]
    ClassifierFailure(String),

    #[error("classifier did not respond within {0:?}")]
    ClassifierTimeout(Duration),

    #[error("selected file is not a recognized image")]
    NotAnImage,

    #[error("no signed-in user")]
    Unauthenticated,
}

impl DetectionError {
    /// Maps a rejected `start_analysis` to the variant describing why.
    pub(crate) fn for_start_from(status: DetectionStatus) -> Option<Self> {
        match status {
            DetectionStatus::Idle => Some(Self::NoImageSelected),
            DetectionStatus::Analyzing => Some(Self::DuplicateAnalysis),
            DetectionStatus::Complete => Some(Self::AnalysisAlreadyComplete),
            DetectionStatus::ImageSelected => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("no narration engine available on this host")]
    Unsupported,

    #[error("narration engine error: {0}")]
    Engine(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_rejection_matches_status() {
        assert_eq!(
            DetectionError::for_start_from(DetectionStatus::Idle),
            Some(DetectionError::NoImageSelected)
        );
        assert_eq!(
            DetectionError::for_start_from(DetectionStatus::Analyzing),
            Some(DetectionError::DuplicateAnalysis)
        );
        assert_eq!(
            DetectionError::for_start_from(DetectionStatus::Complete),
            Some(DetectionError::AnalysisAlreadyComplete)
        );
        assert_eq!(DetectionError::for_start_from(DetectionStatus::ImageSelected), None);
    }

    #[test]
    fn timeout_message_names_duration() {
        let err = DetectionError::ClassifierTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "classifier did not respond within 10s");
    }
}
