//! Box geometry shared by the cascade stages.
//!
//! Coordinates stay floating point while a candidate travels through the
//! cascade and are truncated to integers only when a face is reported.

use serde::Serialize;

/// A candidate face box in image pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Face confidence assigned by the most recent stage
    pub score: f32,
    /// Regression deltas (dx1, dy1, dx2, dy2), relative to width/height
    pub reg: [f32; 4],
    /// Five landmark points as (x, y) offsets, output stage only
    pub landmarks: Option<[f32; 10]>,
}

impl FaceBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score: 0.0,
            reg: [0.0; 4],
            landmarks: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_reg(mut self, reg: [f32; 4]) -> Self {
        self.reg = reg;
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Pixel-inclusive area, `(x2 - x1 + 1) * (y2 - y1 + 1)`.
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1 + 1.0) * (self.y2 - self.y1 + 1.0)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Truncate to integer pixels, mapping back through the input pre-scale.
    ///
    /// `prescale` is the factor the source image was divided by before
    /// detection (1.0 when it was not resized).
    pub fn finalize(&self, prescale: f64) -> BoundingBox {
        let map = |c: f32| -> i32 {
            let c = c as i32;
            if prescale > 1.0 {
                (c as f64 * prescale).ceil() as i32
            } else {
                c
            }
        };
        BoundingBox {
            x1: map(self.x1),
            y1: map(self.y1),
            x2: map(self.x2),
            y2: map(self.y2),
        }
    }
}

/// Final integer face box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Clamp to a `width` x `height` image, returning `(x, y, w, h)` for cropping.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.clamp(0, width as i32);
        let y1 = self.y1.clamp(0, height as i32);
        let x2 = self.x2.clamp(0, width as i32);
        let y2 = self.y2.clamp(0, height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// Denominator used when measuring how much two boxes overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMode {
    /// Intersection over union
    Union,
    /// Intersection over the smaller of the two areas
    Min,
}

/// Overlap ratio of two boxes using pixel-inclusive areas.
pub fn overlap(a: &FaceBox, b: &FaceBox, mode: OverlapMode) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0).max(0.0);
    let inter = w * h;
    if inter == 0.0 {
        return 0.0;
    }

    let (area_a, area_b) = (a.area(), b.area());
    let denom = match mode {
        OverlapMode::Union => area_a + area_b - inter,
        OverlapMode::Min => area_a.min(area_b),
    };

    if denom > 0.0 {
        inter / denom
    } else {
        0.0
    }
}

/// Apply each box's regression deltas to its corners.
///
/// The delta order is (x1, y1, x2, y2); feeding deltas in any other order
/// yields plausible-looking but wrong boxes.
pub fn regress(boxes: &mut [FaceBox]) {
    for b in boxes.iter_mut() {
        let w = b.width();
        let h = b.height();
        b.x1 += b.reg[0] * w;
        b.y1 += b.reg[1] * h;
        b.x2 += b.reg[2] * w;
        b.y2 += b.reg[3] * h;
    }
}

/// Grow the shorter side of each box towards a square, then clamp and floor.
///
/// Clamping happens after growing, so boxes touching the image border come
/// out non-square.
pub fn square(boxes: &mut [FaceBox], img_w: f32, img_h: f32) {
    for b in boxes.iter_mut() {
        let w = b.width();
        let h = b.height();
        let side = w.max(h);
        let loss_w = (side - w) * 0.5;
        let loss_h = (side - h) * 0.5;
        b.x1 = (b.x1 - loss_w).max(0.0).floor();
        b.y1 = (b.y1 - loss_h).max(0.0).floor();
        b.x2 = (b.x2 + loss_w).min(img_w).floor();
        b.y2 = (b.y2 + loss_h).min(img_h).floor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_overlap_union_inclusive_areas() {
        let a = FaceBox::new(0.0, 0.0, 10.0, 10.0);
        let b = FaceBox::new(5.0, 5.0, 15.0, 15.0);
        // 6x6 intersection over 121 + 121 - 36
        assert!(approx(overlap(&a, &b, OverlapMode::Union), 36.0 / 206.0));
    }

    #[test]
    fn test_overlap_min() {
        let outer = FaceBox::new(0.0, 0.0, 19.0, 19.0);
        let inner = FaceBox::new(5.0, 5.0, 9.0, 9.0);
        assert!(approx(overlap(&outer, &inner, OverlapMode::Min), 1.0));
        assert!(overlap(&outer, &inner, OverlapMode::Union) < 0.1);
    }

    #[test]
    fn test_overlap_symmetric() {
        let boxes = [
            FaceBox::new(0.0, 0.0, 10.0, 10.0),
            FaceBox::new(5.0, 5.0, 15.0, 15.0),
            FaceBox::new(3.0, 8.0, 40.0, 12.0),
            FaceBox::new(100.0, 100.0, 120.0, 130.0),
        ];
        for a in &boxes {
            for b in &boxes {
                for mode in [OverlapMode::Union, OverlapMode::Min] {
                    assert_eq!(overlap(a, b, mode), overlap(b, a, mode));
                }
            }
        }
    }

    #[test]
    fn test_overlap_disjoint() {
        let a = FaceBox::new(0.0, 0.0, 10.0, 10.0);
        let c = FaceBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(overlap(&a, &c, OverlapMode::Union), 0.0);
        assert_eq!(overlap(&a, &c, OverlapMode::Min), 0.0);
    }

    #[test]
    fn test_regress() {
        let mut boxes = vec![FaceBox::new(10.0, 20.0, 30.0, 60.0).with_reg([0.1, -0.25, 0.5, 0.0])];
        regress(&mut boxes);
        let b = &boxes[0];
        assert!(approx(b.x1, 12.0));
        assert!(approx(b.y1, 10.0));
        assert!(approx(b.x2, 40.0));
        assert!(approx(b.y2, 60.0));
    }

    #[test]
    fn test_regress_delta_order_matters() {
        let deltas = [0.1, -0.25, 0.5, 0.0];
        let swapped = [deltas[1], deltas[0], deltas[3], deltas[2]];

        let mut straight = vec![FaceBox::new(10.0, 20.0, 30.0, 60.0).with_reg(deltas)];
        let mut crossed = vec![FaceBox::new(10.0, 20.0, 30.0, 60.0).with_reg(swapped)];
        regress(&mut straight);
        regress(&mut crossed);

        // Both results are valid-looking boxes, yet they differ.
        assert!(!crossed[0].is_degenerate());
        assert_ne!(straight[0], crossed[0]);
    }

    #[test]
    fn test_square_inside_image() {
        let mut boxes = vec![FaceBox::new(10.0, 10.0, 20.0, 30.0)];
        square(&mut boxes, 100.0, 100.0);
        let b = &boxes[0];
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (5.0, 10.0, 25.0, 30.0));
        assert_eq!(b.width(), b.height());
    }

    #[test]
    fn test_square_at_border_is_not_square() {
        let mut boxes = vec![FaceBox::new(2.0, 10.0, 12.0, 40.0)];
        square(&mut boxes, 100.0, 100.0);
        let b = &boxes[0];
        // x1 would be -8 before clamping
        assert_eq!((b.x1, b.x2), (0.0, 22.0));
        assert_ne!(b.width(), b.height());
    }

    #[test]
    fn test_square_floors() {
        let mut boxes = vec![FaceBox::new(10.5, 10.5, 20.7, 25.2)];
        square(&mut boxes, 100.0, 100.0);
        let b = &boxes[0];
        assert_eq!(b.x1.fract(), 0.0);
        assert_eq!(b.y2.fract(), 0.0);
    }

    #[test]
    fn test_finalize_without_prescale_truncates() {
        let b = FaceBox::new(10.9, 5.2, 50.7, 60.99);
        assert_eq!(
            b.finalize(1.0),
            BoundingBox {
                x1: 10,
                y1: 5,
                x2: 50,
                y2: 60,
            }
        );
    }

    #[test]
    fn test_finalize_with_prescale_ceils() {
        let b = FaceBox::new(10.9, 5.2, 50.7, 60.0);
        assert_eq!(
            b.finalize(1.5),
            BoundingBox {
                x1: 15,
                y1: 8,
                x2: 75,
                y2: 90,
            }
        );
    }

    #[test]
    fn test_clamp_to() {
        let b = BoundingBox {
            x1: -5,
            y1: 10,
            x2: 40,
            y2: 300,
        };
        assert_eq!(b.clamp_to(100, 200), Some((0, 10, 40, 190)));

        let outside = BoundingBox {
            x1: 150,
            y1: 10,
            x2: 160,
            y2: 20,
        };
        assert_eq!(outside.clamp_to(100, 200), None);
    }
}
