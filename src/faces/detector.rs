use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

use super::bbox::BoundingBox;
use super::inference::Inference;
use super::stages::{OutputStage, ProposalStage, RefineStage};
use crate::config::DetectionConfig;
use crate::error::{FaceError, Result};

/// Face embedding vector
pub type Embedding = Vec<f32>;

/// A detected face with bounding box and embedding
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Landmark offsets reported by the output stage
    pub landmarks: Option<[f32; 10]>,
    /// Empty until the face has been run through a feature extractor
    pub embedding: Embedding,
}

/// Three-stage cascaded face detector
pub struct CascadeDetector {
    proposal: Box<dyn Inference>,
    refine: Box<dyn Inference>,
    output: Box<dyn Inference>,
    config: DetectionConfig,
}

impl CascadeDetector {
    pub fn new(
        proposal: Box<dyn Inference>,
        refine: Box<dyn Inference>,
        output: Box<dyn Inference>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            proposal,
            refine,
            output,
            config,
        }
    }

    /// Detect faces in an RGB image.
    ///
    /// An image without faces yields an empty list, not an error.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>> {
        let (prescale, scaled) = self.prescale(image);
        let input = scaled.as_ref().unwrap_or(image);
        let [t_proposal, t_refine, t_output] = self.config.thresholds;

        let proposals = ProposalStage::new(
            self.proposal.as_ref(),
            self.config.min_face_size,
            self.config.scale_factor,
        )
        .run(input, t_proposal)?;
        if proposals.is_empty() {
            return Ok(Vec::new());
        }

        let refined = RefineStage::new(self.refine.as_ref()).run(input, proposals, t_refine)?;
        if refined.is_empty() {
            return Ok(Vec::new());
        }

        let finals = OutputStage::new(self.output.as_ref()).run(input, refined, t_output)?;

        Ok(finals
            .into_iter()
            .map(|b| DetectedFace {
                bbox: b.finalize(prescale),
                confidence: b.score,
                landmarks: b.landmarks,
                embedding: Vec::new(),
            })
            .collect())
    }

    /// Downscale large inputs so the longer side equals `max_input_side`.
    ///
    /// Returns the factor to multiply detected coordinates by, and the
    /// resized copy when one was needed.
    fn prescale(&self, image: &RgbImage) -> (f64, Option<RgbImage>) {
        let (width, height) = image.dimensions();
        let limit = self.config.max_input_side;
        let longer = width.max(height);
        if limit == 0 || longer <= limit {
            return (1.0, None);
        }

        let factor = longer as f64 / limit as f64;
        let new_w = ((width as f64 / factor).round() as u32).max(1);
        let new_h = ((height as f64 / factor).round() as u32).max(1);
        tracing::debug!(factor, new_w, new_h, "Downscaling input for detection");

        (
            factor,
            Some(imageops::resize(image, new_w, new_h, FilterType::Triangle)),
        )
    }
}

/// Load an image file as RGB
pub fn load_image(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| FaceError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Crop every face region out of the image it was detected in.
///
/// Boxes are clamped to the image; faces lying entirely outside it get
/// `None`.
pub fn crop_faces(image: &RgbImage, faces: &[DetectedFace]) -> Vec<Option<RgbImage>> {
    let (width, height) = image.dimensions();
    faces
        .iter()
        .map(|face| {
            face.bbox
                .clamp_to(width, height)
                .map(|(x, y, w, h)| imageops::crop_imm(image, x, y, w, h).to_image())
        })
        .collect()
}
