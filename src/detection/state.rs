use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DetectionError;

use super::ImageHandle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectionStatus {
    #[default]
    Idle,
    ImageSelected,
    Analyzing,
    Complete,
}

/// Everything a classifier needs for one analysis, captured when it starts.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub generation: u64,
    pub image_id: Uuid,
    pub image: Arc<[u8]>,
    pub cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The image was replaced or cleared after the analysis started.
    Stale,
}

/// Serializable view published to observers after every transition.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSnapshot {
    pub status: DetectionStatus,
    pub image_id: Option<Uuid>,
    pub diagnosis_index: Option<usize>,
    pub diagnosis_cursor: usize,
    pub last_error: Option<DetectionError>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Detection workflow for one user interaction.
///
/// Transitions are plain methods with no IO so the controller can apply them
/// under its lock and tests can drive them directly.
#[derive(Debug, Default)]
pub struct DetectionSession {
    status: DetectionStatus,
    image: Option<ImageHandle>,
    diagnosis: Option<usize>,
    diagnosis_cursor: usize,
    /// Bumped whenever the image changes; completions from older generations are dropped.
    generation: u64,
    last_error: Option<DetectionError>,
    completed_at: Option<DateTime<Utc>>,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> DetectionStatus {
        self.status
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        self.image.as_ref()
    }

    pub fn diagnosis(&self) -> Option<usize> {
        self.diagnosis
    }

    pub fn diagnosis_cursor(&self) -> usize {
        self.diagnosis_cursor
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        DetectionSnapshot {
            status: self.status,
            image_id: self.image.as_ref().map(ImageHandle::id),
            diagnosis_index: self.diagnosis,
            diagnosis_cursor: self.diagnosis_cursor,
            last_error: self.last_error.clone(),
            completed_at: self.completed_at,
        }
    }

    /// Stores `image`, returning the handle it replaced so the caller decides when it drops.
    pub fn select_image(&mut self, image: ImageHandle) -> Option<ImageHandle> {
        let previous = self.image.replace(image);
        self.reset_outcome();
        self.status = DetectionStatus::ImageSelected;
        previous
    }

    pub fn clear_image(&mut self) -> Option<ImageHandle> {
        let previous = self.image.take();
        self.reset_outcome();
        self.status = DetectionStatus::Idle;
        previous
    }

    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, DetectionError> {
        if let Some(err) = DetectionError::for_start_from(self.status) {
            return Err(err);
        }
        let image = self.image.as_ref().ok_or(DetectionError::NoImageSelected)?;

        let ticket = AnalysisTicket {
            generation: self.generation,
            image_id: image.id(),
            image: image.bytes(),
            cursor: self.diagnosis_cursor,
        };
        self.status = DetectionStatus::Analyzing;
        self.last_error = None;
        Ok(ticket)
    }

    /// Applies a classifier result. `outcome` carries a catalog index on success.
    pub fn complete_analysis(
        &mut self,
        generation: u64,
        outcome: Result<usize, DetectionError>,
        catalog_len: usize,
        now: DateTime<Utc>,
    ) -> Completion {
        if generation != self.generation || self.status != DetectionStatus::Analyzing {
            return Completion::Stale;
        }

        let outcome = outcome.and_then(|index| {
            if index < catalog_len {
                Ok(index)
            } else {
                Err(DetectionError::ClassifierFailure(format!(
                    "diagnosis {index} outside catalog of {catalog_len}"
                )))
            }
        });

        match outcome {
            Ok(index) => {
                self.diagnosis = Some(index);
                self.diagnosis_cursor = (self.diagnosis_cursor + 1) % catalog_len;
                self.status = DetectionStatus::Complete;
                self.completed_at = Some(now);
            }
            Err(err) => {
                self.status = DetectionStatus::ImageSelected;
                self.last_error = Some(err);
            }
        }
        Completion::Applied
    }

    fn reset_outcome(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.diagnosis = None;
        self.last_error = None;
        self.completed_at = None;
    }
}
