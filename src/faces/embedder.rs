use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use rayon::prelude::*;

use super::detector::{crop_faces, DetectedFace, Embedding};
use super::inference::{output, Inference};
use crate::error::Result;

/// Turns face crops into embedding vectors.
pub struct FeatureExtractor {
    model: Box<dyn Inference>,
    input_size: u32,
    output_index: usize,
}

impl FeatureExtractor {
    /// `input_size` is the square side the model expects; the embedding is
    /// read from output `output_index`.
    pub fn new(model: Box<dyn Inference>, input_size: u32, output_index: usize) -> Self {
        Self {
            model,
            input_size,
            output_index,
        }
    }

    /// Embed a single face crop
    pub fn embed(&self, face: &RgbImage) -> Result<Embedding> {
        let size = self.input_size;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);
        let outputs = self.model.infer(prewhiten(&resized))?;
        let embedding = output(&outputs, self.output_index, "embedding")?;
        Ok(embedding.iter().copied().collect())
    }

    /// Fill in the embedding of every face detected in `image`, embedding
    /// the crops in parallel.
    ///
    /// Faces whose box does not intersect the image keep an empty embedding.
    pub fn embed_detected(&self, image: &RgbImage, faces: &mut [DetectedFace]) -> Result<()> {
        let crops = crop_faces(image, faces);
        let embeddings = crops
            .par_iter()
            .map(|crop| match crop {
                Some(crop) => self.embed(crop).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        for (face, embedding) in faces.iter_mut().zip(embeddings) {
            match embedding {
                Some(embedding) => face.embedding = embedding,
                None => {
                    tracing::debug!(bbox = ?face.bbox, "Face lies outside the image, not embedded")
                }
            }
        }
        Ok(())
    }
}

/// Standardise a crop to zero mean and unit variance over all its samples.
///
/// The deviation is floored at `1/sqrt(N)` so flat crops do not blow up.
fn prewhiten(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let raw = image.as_raw();
    let n = raw.len() as f32;

    let mean = raw.iter().map(|&v| v as f32).sum::<f32>() / n;
    let variance = raw.iter().map(|&v| (v as f32 - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt().max(1.0 / n.sqrt());

    Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        let pixel = image.get_pixel(x as u32, y as u32);
        (pixel[c] as f32 - mean) / std
    })
}
