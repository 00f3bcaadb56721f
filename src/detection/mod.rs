pub mod classifier;
pub mod controller;
pub mod image;
pub mod state;

pub use classifier::{AnyClassifier, Classifier, ClassifierKind, ClassifyRequest};
pub use controller::DetectionController;
pub use image::ImageHandle;
pub use state::{AnalysisTicket, Completion, DetectionSession, DetectionSnapshot, DetectionStatus};
