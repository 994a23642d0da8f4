use serde::{Deserialize, Serialize};

/// Default maximum cosine distance for two faces to match
pub const DEFAULT_COSINE_THRESHOLD: f32 = 0.4;
/// Default maximum euclidean distance for two faces to match
pub const DEFAULT_EUCLIDEAN_THRESHOLD: f32 = 1.1;

/// Distance metric between two embeddings.
///
/// Smaller distances mean more similar faces; a distance strictly below
/// [`threshold`](FeatureVerifier::threshold) is a match.
pub trait FeatureVerifier: Send + Sync {
    fn verify(&self, source: &[f32], test: &[f32]) -> f32;
    fn threshold(&self) -> f32;
    fn name(&self) -> &'static str;
}

/// Which verifier to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    Cosine,
    Euclidean,
}

impl VerifierKind {
    /// Build the verifier, with `threshold` overriding its default.
    pub fn build(self, threshold: Option<f32>) -> Box<dyn FeatureVerifier> {
        match self {
            VerifierKind::Cosine => Box::new(CosineVerifier {
                threshold: threshold.unwrap_or(DEFAULT_COSINE_THRESHOLD),
            }),
            VerifierKind::Euclidean => Box::new(EuclideanVerifier {
                threshold: threshold.unwrap_or(DEFAULT_EUCLIDEAN_THRESHOLD),
            }),
        }
    }
}

/// `1 - cosine similarity`
#[derive(Debug, Clone)]
pub struct CosineVerifier {
    pub threshold: f32,
}

impl Default for CosineVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COSINE_THRESHOLD,
        }
    }
}

impl FeatureVerifier for CosineVerifier {
    fn verify(&self, source: &[f32], test: &[f32]) -> f32 {
        if source.len() != test.len() {
            return f32::MAX;
        }
        // Rounding can push the similarity of parallel vectors just above 1
        (1.0 - cosine_similarity(source, test)).max(0.0)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn name(&self) -> &'static str {
        "cosine"
    }
}

/// L2 distance
#[derive(Debug, Clone)]
pub struct EuclideanVerifier {
    pub threshold: f32,
}

impl Default for EuclideanVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_EUCLIDEAN_THRESHOLD,
        }
    }
}

impl FeatureVerifier for EuclideanVerifier {
    fn verify(&self, source: &[f32], test: &[f32]) -> f32 {
        if source.len() != test.len() {
            return f32::MAX;
        }

        source
            .iter()
            .zip(test.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        let v = CosineVerifier::default();
        assert!(v.verify(&[1.0, 0.0, 0.0], &[2.0, 0.0, 0.0]).abs() < 1e-6);
        assert!((v.verify(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((v.verify(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_self_distance_is_never_negative() {
        let v = CosineVerifier::default();
        let mut state: u32 = 0x2545_f491;
        for _ in 0..500 {
            let vector: Vec<f32> = (0..128)
                .map(|_| {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
                })
                .collect();
            let distance = v.verify(&vector, &vector);
            assert!(distance >= 0.0, "negative self-distance {}", distance);
            assert!(distance < 1e-5);
        }
    }

    #[test]
    fn test_cosine_zero_norm() {
        let v = CosineVerifier::default();
        assert_eq!(v.verify(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let v = EuclideanVerifier::default();
        assert!((v.verify(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(v.verify(&[1.5, -2.0], &[1.5, -2.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_never_match() {
        for kind in [VerifierKind::Cosine, VerifierKind::Euclidean] {
            let v = kind.build(None);
            assert_eq!(v.verify(&[1.0, 2.0], &[1.0, 2.0, 3.0]), f32::MAX);
        }
    }

    #[test]
    fn test_build_thresholds() {
        assert_eq!(VerifierKind::Cosine.build(None).threshold(), 0.4);
        assert_eq!(VerifierKind::Euclidean.build(None).threshold(), 1.1);
        assert_eq!(VerifierKind::Euclidean.build(Some(0.8)).threshold(), 0.8);
        assert_eq!(VerifierKind::Cosine.build(None).name(), "cosine");
    }
}
