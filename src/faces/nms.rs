use super::bbox::{overlap, FaceBox, OverlapMode};

/// Greedy non-maximum suppression.
///
/// Boxes are sorted by ascending score (stable) and consumed from the top:
/// the best remaining box is kept and every box overlapping it by more than
/// `threshold` is discarded. Callers must not rely on the output order.
pub fn nms(mut boxes: Vec<FaceBox>, threshold: f32, mode: OverlapMode) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| a.score.total_cmp(&b.score));

    let mut keep = Vec::with_capacity(boxes.len());
    while let Some(best) = boxes.pop() {
        boxes.retain(|other| overlap(&best, other, mode) <= threshold);
        keep.push(best);
    }

    keep
}
