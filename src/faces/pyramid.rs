use crate::error::{FaceError, Result};

/// Side of the proposal network's detection window, in pixels.
pub const WINDOW_SIZE: f64 = 12.0;

/// Resize factors used to search for faces of different sizes.
///
/// The first factor maps the 12 px detection window onto `min_size` pixels;
/// every following factor shrinks the previous one by `factor`, until the
/// shorter image side would fall below the window size.
#[derive(Debug, Clone)]
pub struct ScalePyramid {
    min_side: f64,
    factor: f64,
    next: f64,
}

impl ScalePyramid {
    pub fn new(height: u32, width: u32, min_size: u32, factor: f64) -> Result<Self> {
        if min_size == 0 {
            return Err(FaceError::InvalidInput(
                "minimum face size must be > 0".to_string(),
            ));
        }
        if !(factor > 0.0 && factor < 1.0) {
            return Err(FaceError::InvalidInput(format!(
                "pyramid factor must be between 0 and 1 (exclusive), got {}",
                factor
            )));
        }

        Ok(Self {
            min_side: height.min(width) as f64,
            factor,
            next: WINDOW_SIZE / min_size as f64,
        })
    }
}

impl Iterator for ScalePyramid {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.min_side * self.next < WINDOW_SIZE {
            return None;
        }
        let scale = self.next;
        self.next *= self.factor;
        Some(scale)
    }
}
