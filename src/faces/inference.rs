//! Neural network boundary.
//!
//! The cascade and the embedder only ever see [`Inference`]: a batch of NCHW
//! pixels goes in, the model's outputs come back in declaration order.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::{Array2, Array4, ArrayD, ArrayView4, Ix4, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::error::{FaceError, Result};

/// Mean subtracted from every pixel before the cascade networks
pub const PIXEL_MEAN: f32 = 127.5;
/// Scale applied after mean subtraction (1/128)
pub const PIXEL_SCALE: f32 = 0.0078125;

/// Runs a network over a batch of images.
pub trait Inference: Send + Sync {
    /// `input` is shaped (batch, channel, height, width).
    fn infer(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>>;
}

/// ONNX Runtime backed model.
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
}

impl OnnxModel {
    pub fn load(path: &Path, input_name: &str, intra_threads: usize) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Model file does not exist: {:?}", path);
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(path)?;

        tracing::debug!(model = ?path, "Model loaded");
        Ok(Self {
            session: Mutex::new(session),
            input_name: input_name.to_string(),
        })
    }
}

impl Inference for OnnxModel {
    fn infer(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array(([n, c, h, w], data.into_boxed_slice()))
            .map_err(|e| FaceError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| FaceError::Inference(format!("failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| FaceError::Inference(e.to_string()))?;

        let mut result = Vec::new();
        for (name, value) in outputs.iter() {
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::ModelOutput(format!("{}: {}", name, e)))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            result.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }

        Ok(result)
    }
}

/// Pack RGB images of identical size into a normalised NCHW batch.
pub fn normalized_batch(images: &[RgbImage]) -> Result<Array4<f32>> {
    let (width, height) = match images.first() {
        Some(img) => img.dimensions(),
        None => return Ok(Array4::zeros((0, 3, 0, 0))),
    };
    if images.iter().any(|img| img.dimensions() != (width, height)) {
        return Err(FaceError::InvalidInput(
            "batch images must share dimensions".to_string(),
        ));
    }

    Ok(Array4::from_shape_fn(
        (images.len(), 3, height as usize, width as usize),
        |(i, c, y, x)| {
            let pixel = images[i].get_pixel(x as u32, y as u32);
            (pixel[c] as f32 - PIXEL_MEAN) * PIXEL_SCALE
        },
    ))
}

/// Fetch output `index` or report which output is missing.
pub(crate) fn output<'a>(
    outputs: &'a [ArrayD<f32>],
    index: usize,
    what: &str,
) -> Result<&'a ArrayD<f32>> {
    outputs.get(index).ok_or_else(|| {
        FaceError::ModelOutput(format!(
            "missing {} (output {}, model returned {})",
            what,
            index,
            outputs.len()
        ))
    })
}

/// View a per-pixel map output as (batch, channel, height, width).
pub(crate) fn as_map(tensor: &ArrayD<f32>) -> Result<ArrayView4<'_, f32>> {
    Ok(tensor.view().into_dimensionality::<Ix4>()?)
}

/// Reshape a per-box output into `rows` x `cols`.
pub(crate) fn as_rows(tensor: &ArrayD<f32>, rows: usize, cols: usize) -> Result<Array2<f32>> {
    if tensor.len() != rows * cols {
        return Err(FaceError::ModelOutput(format!(
            "expected {} x {} values, got shape {:?}",
            rows,
            cols,
            tensor.shape()
        )));
    }
    Ok(tensor.to_shape((rows, cols))?.into_owned())
}
