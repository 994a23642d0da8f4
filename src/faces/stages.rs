//! The three cascade stages.
//!
//! Each stage narrows and refines the candidate set produced by the previous
//! one. An empty result is a valid outcome and ends the cascade early.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::s;
use tracing::debug;

use super::bbox::{regress, square, FaceBox, OverlapMode};
use super::inference::{as_map, as_rows, normalized_batch, output, Inference};
use super::nms::nms;
use super::pyramid::{ScalePyramid, WINDOW_SIZE};
use crate::error::{FaceError, Result};

/// Grid stride of the proposal network, in pixels of the scaled image.
const PROPOSAL_STRIDE: f64 = 2.0;
/// Channel of the classification output holding the face probability.
const FACE_CHANNEL: usize = 1;

const PER_SCALE_NMS: f32 = 0.5;
const PROPOSAL_NMS: f32 = 0.7;
const REFINE_NMS: f32 = 0.7;
const OUTPUT_NMS: f32 = 0.7;

const REFINE_INPUT: u32 = 24;
const OUTPUT_INPUT: u32 = 48;

/// Stage 1: slide the proposal network over a scale pyramid.
pub struct ProposalStage<'a> {
    model: &'a dyn Inference,
    min_face_size: u32,
    scale_factor: f64,
}

impl<'a> ProposalStage<'a> {
    pub fn new(model: &'a dyn Inference, min_face_size: u32, scale_factor: f64) -> Self {
        Self {
            model,
            min_face_size,
            scale_factor,
        }
    }

    pub fn run(&self, image: &RgbImage, threshold: f32) -> Result<Vec<FaceBox>> {
        let (width, height) = image.dimensions();
        let mut pyramid = ScalePyramid::new(height, width, self.min_face_size, self.scale_factor)?;

        let candidates = pyramid.try_fold(Vec::new(), |mut acc, scale| {
            let boxes = self.evaluate_scale(image, scale, threshold)?;
            if !boxes.is_empty() {
                acc.extend(nms(boxes, PER_SCALE_NMS, OverlapMode::Union));
            }
            Ok::<_, FaceError>(acc)
        })?;

        if candidates.is_empty() {
            debug!("Proposal stage found no candidates");
            return Ok(candidates);
        }

        let mut boxes = nms(candidates, PROPOSAL_NMS, OverlapMode::Union);
        regress(&mut boxes);
        square(&mut boxes, width as f32, height as f32);

        debug!(count = boxes.len(), "Proposal stage finished");
        Ok(boxes)
    }

    /// Run the network on one resized copy and map hits back to image space.
    fn evaluate_scale(&self, image: &RgbImage, scale: f64, threshold: f32) -> Result<Vec<FaceBox>> {
        let (width, height) = image.dimensions();
        let scaled_w = (width as f64 * scale).ceil() as u32;
        let scaled_h = (height as f64 * scale).ceil() as u32;
        let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

        let outputs = self.model.infer(normalized_batch(&[resized])?)?;
        let scores = as_map(output(&outputs, 0, "face scores")?)?;
        let regs = as_map(output(&outputs, 1, "box regression")?)?;

        if scores.shape()[1] <= FACE_CHANNEL
            || regs.shape()[1] < 4
            || scores.shape()[2..] != regs.shape()[2..]
        {
            return Err(FaceError::ModelOutput(format!(
                "score map {:?} and regression map {:?} do not line up",
                scores.shape(),
                regs.shape()
            )));
        }

        let score_map = scores.slice(s![0, FACE_CHANNEL, .., ..]);
        let boxes = score_map
            .indexed_iter()
            .filter(|&(_, &score)| score >= threshold)
            .map(|((y, x), &score)| {
                let (gx, gy) = (x as f64 * PROPOSAL_STRIDE, y as f64 * PROPOSAL_STRIDE);
                FaceBox::new(
                    ((gx + 1.0) / scale).floor() as f32,
                    ((gy + 1.0) / scale).floor() as f32,
                    ((gx + WINDOW_SIZE) / scale).floor() as f32,
                    ((gy + WINDOW_SIZE) / scale).floor() as f32,
                )
                .with_score(score)
                .with_reg([
                    regs[[0, 0, y, x]],
                    regs[[0, 1, y, x]],
                    regs[[0, 2, y, x]],
                    regs[[0, 3, y, x]],
                ])
            })
            .collect::<Vec<_>>();

        debug!(scale, count = boxes.len(), "Evaluated pyramid scale");
        Ok(boxes)
    }
}

/// Stage 2: re-score proposals on 24x24 crops.
pub struct RefineStage<'a> {
    model: &'a dyn Inference,
}

impl<'a> RefineStage<'a> {
    pub fn new(model: &'a dyn Inference) -> Self {
        Self { model }
    }

    pub fn run(
        &self,
        image: &RgbImage,
        boxes: Vec<FaceBox>,
        threshold: f32,
    ) -> Result<Vec<FaceBox>> {
        let scored = score_crops(self.model, image, boxes, REFINE_INPUT, threshold, false)?;
        if scored.is_empty() {
            debug!("Refine stage rejected every candidate");
            return Ok(scored);
        }

        let (width, height) = image.dimensions();
        let mut boxes = nms(scored, REFINE_NMS, OverlapMode::Union);
        regress(&mut boxes);
        square(&mut boxes, width as f32, height as f32);

        debug!(count = boxes.len(), "Refine stage finished");
        Ok(boxes)
    }
}

/// Stage 3: final scoring on 48x48 crops, with landmarks.
pub struct OutputStage<'a> {
    model: &'a dyn Inference,
}

impl<'a> OutputStage<'a> {
    pub fn new(model: &'a dyn Inference) -> Self {
        Self { model }
    }

    pub fn run(
        &self,
        image: &RgbImage,
        boxes: Vec<FaceBox>,
        threshold: f32,
    ) -> Result<Vec<FaceBox>> {
        let mut scored = score_crops(self.model, image, boxes, OUTPUT_INPUT, threshold, true)?;
        if scored.is_empty() {
            debug!("Output stage rejected every candidate");
            return Ok(scored);
        }

        regress(&mut scored);
        let boxes = nms(scored, OUTPUT_NMS, OverlapMode::Min);

        debug!(count = boxes.len(), "Output stage finished");
        Ok(boxes)
    }
}

/// Crop every box, batch it through `model` and keep boxes scoring above
/// `threshold`, carrying the new score, deltas and (optionally) landmarks.
fn score_crops(
    model: &dyn Inference,
    image: &RgbImage,
    boxes: Vec<FaceBox>,
    size: u32,
    threshold: f32,
    with_landmarks: bool,
) -> Result<Vec<FaceBox>> {
    let boxes: Vec<FaceBox> = boxes.into_iter().filter(|b| !b.is_degenerate()).collect();
    if boxes.is_empty() {
        return Ok(boxes);
    }

    let crops: Vec<RgbImage> = boxes.iter().map(|b| crop_resized(image, b, size)).collect();
    let n = crops.len();
    let outputs = model.infer(normalized_batch(&crops)?)?;

    let scores = as_rows(output(&outputs, 0, "face scores")?, n, 2)?;
    let regs = as_rows(output(&outputs, 1, "box regression")?, n, 4)?;
    let landmarks = match outputs.get(2) {
        Some(t) if with_landmarks => Some(as_rows(t, n, 10)?),
        _ => None,
    };

    let kept = boxes
        .into_iter()
        .enumerate()
        .filter(|(i, _)| scores[[*i, FACE_CHANNEL]] > threshold)
        .map(|(i, b)| {
            let mut b = b
                .with_score(scores[[i, FACE_CHANNEL]])
                .with_reg([regs[[i, 0]], regs[[i, 1]], regs[[i, 2]], regs[[i, 3]]]);
            if let Some(ref marks) = landmarks {
                let mut points = [0.0f32; 10];
                for (k, p) in points.iter_mut().enumerate() {
                    *p = marks[[i, k]];
                }
                b.landmarks = Some(points);
            }
            b
        })
        .collect::<Vec<_>>();

    debug!(input = n, kept = kept.len(), threshold, "Scored candidate crops");
    Ok(kept)
}

/// Crop `b` from `image` (clamped to the image, at least one pixel) and
/// resize the crop to `size` x `size`.
fn crop_resized(image: &RgbImage, b: &FaceBox, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let x = (b.x1.max(0.0) as u32).min(width.saturating_sub(1));
    let y = (b.y1.max(0.0) as u32).min(height.saturating_sub(1));
    let w = ((b.x2.max(0.0) as u32).min(width).saturating_sub(x)).max(1);
    let h = ((b.y2.max(0.0) as u32).min(height).saturating_sub(y)).max(1);

    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
    imageops::resize(&crop, size, size, FilterType::Triangle)
}
