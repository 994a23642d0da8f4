use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use super::bbox::BoundingBox;
use super::detector::{load_image, CascadeDetector, DetectedFace};
use super::embedder::FeatureExtractor;
use super::inference::OnnxModel;
use crate::bank::{FeatureBank, MatchOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::scanner::{discover_training_set, TrainingImage};

/// Status updates during enrollment
#[derive(Debug, Clone)]
pub enum EnrollmentStatus {
    /// Training images found
    Starting { total_images: usize },
    /// Detecting faces in an image
    Processing {
        current: usize,
        total: usize,
        path: String,
    },
    /// Faces of an image were added to the bank
    Enrolled {
        path: String,
        label: String,
        faces: usize,
    },
    /// An image could not be processed
    Error { message: String },
    /// Completed enrollment
    Completed {
        images_processed: usize,
        faces_enrolled: usize,
        failures: usize,
    },
}

/// Totals of an enrollment run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollmentSummary {
    pub images: usize,
    pub faces: usize,
    pub failures: usize,
}

/// One detected face of a query image and who it resembles
#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    pub path: PathBuf,
    pub face: usize,
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

/// Detects faces, embeds them and talks to a feature bank
pub struct FaceProcessor {
    detector: CascadeDetector,
    extractor: FeatureExtractor,
}

impl FaceProcessor {
    pub fn new(detector: CascadeDetector, extractor: FeatureExtractor) -> Self {
        Self {
            detector,
            extractor,
        }
    }

    /// Load the four ONNX models named in the config
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let models = &config.models;
        let load = |file: &Path| -> anyhow::Result<Box<OnnxModel>> {
            let path = models.resolve(file);
            let model = OnnxModel::load(&path, &models.input_name, models.intra_threads)
                .with_context(|| format!("Failed to load model {:?}", path))?;
            Ok(Box::new(model))
        };

        let detector = CascadeDetector::new(
            load(models.proposal.as_path())?,
            load(models.refine.as_path())?,
            load(models.output.as_path())?,
            config.detection.clone(),
        );
        let extractor = FeatureExtractor::new(
            load(models.embedder.as_path())?,
            models.embedder_input_size,
            models.embedding_output,
        );

        tracing::info!(dir = ?models.dir, "Face models loaded");
        Ok(Self::new(detector, extractor))
    }

    /// Detect and embed every face in an image file.
    ///
    /// Faces that could not be embedded are dropped.
    pub fn process_image(&self, path: &Path) -> Result<Vec<DetectedFace>> {
        let image = load_image(path)?;
        let mut faces = self.detector.detect(&image)?;
        self.extractor.embed_detected(&image, &mut faces)?;
        faces.retain(|face| !face.embedding.is_empty());

        tracing::debug!(path = ?path, faces = faces.len(), "Processed image");
        Ok(faces)
    }

    /// Enroll every face of every training image under `root`, labelled by
    /// the person folder (`root/<label>/...`) it sits in.
    ///
    /// Images are processed in parallel but enrolled in path order, so the
    /// bank's contents do not depend on scheduling. Images that fail are
    /// logged, reported and counted; the rest still get enrolled.
    pub fn enroll_directory(
        &self,
        bank: &FeatureBank,
        root: &Path,
        extensions: &[String],
        status_sender: Option<mpsc::Sender<EnrollmentStatus>>,
    ) -> Result<EnrollmentSummary> {
        let images = discover_training_set(root, extensions)?;
        let total = images.len();
        tracing::info!(root = ?root, images = total, "Enrollment started");

        if let Some(ref tx) = status_sender {
            let _ = tx.send(EnrollmentStatus::Starting { total_images: total });
        }

        let results: Vec<(&TrainingImage, Result<Vec<DetectedFace>>)> = images
            .par_iter()
            .enumerate()
            .map_with(status_sender.clone(), |tx, (idx, image)| {
                if let Some(tx) = tx {
                    let _ = tx.send(EnrollmentStatus::Processing {
                        current: idx + 1,
                        total,
                        path: image.path.display().to_string(),
                    });
                }
                (image, self.process_image(&image.path))
            })
            .collect();

        let mut summary = EnrollmentSummary::default();
        for (image, result) in results {
            let path = image.path.display().to_string();
            match result {
                Ok(faces) => {
                    let enrolled = faces
                        .iter()
                        .filter(|face| bank.put(&image.label, &face.embedding))
                        .count();
                    if enrolled == 0 {
                        tracing::warn!(path = %path, "No face found in training image");
                    }

                    summary.images += 1;
                    summary.faces += enrolled;

                    if let Some(ref tx) = status_sender {
                        let _ = tx.send(EnrollmentStatus::Enrolled {
                            path,
                            label: image.label.clone(),
                            faces: enrolled,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to enroll image");
                    summary.failures += 1;

                    if let Some(ref tx) = status_sender {
                        let _ = tx.send(EnrollmentStatus::Error {
                            message: format!("Error processing {}: {}", path, e),
                        });
                    }
                }
            }
        }

        if let Some(ref tx) = status_sender {
            let _ = tx.send(EnrollmentStatus::Completed {
                images_processed: summary.images,
                faces_enrolled: summary.faces,
                failures: summary.failures,
            });
        }

        tracing::info!(
            images = summary.images,
            faces = summary.faces,
            failures = summary.failures,
            labels = bank.labels().len(),
            "Enrollment finished"
        );
        Ok(summary)
    }

    /// Look up every face of a query image in the bank
    pub fn identify(&self, bank: &FeatureBank, path: &Path) -> Result<Vec<Identification>> {
        let faces = self.process_image(path)?;

        Ok(faces
            .into_iter()
            .enumerate()
            .map(|(idx, face)| Identification {
                path: path.to_path_buf(),
                face: idx,
                bbox: face.bbox,
                confidence: face.confidence,
                outcome: bank.find_match(&face.embedding),
            })
            .collect())
    }
}
