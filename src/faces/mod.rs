pub mod bbox;
pub mod detector;
pub mod embedder;
pub mod inference;
mod nms;
pub mod processor;
mod pyramid;
mod stages;

pub use bbox::BoundingBox;
pub use detector::{crop_faces, CascadeDetector, DetectedFace, Embedding};
pub use embedder::FeatureExtractor;
pub use inference::{Inference, OnnxModel};
pub use processor::{EnrollmentStatus, EnrollmentSummary, FaceProcessor, Identification};
