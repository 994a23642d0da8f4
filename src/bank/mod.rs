//! Labelled face embeddings and nearest-neighbour lookup.
//!
//! A [`FeatureBank`] combines a storage strategy (how many embeddings a label
//! may own) with a [`FeatureVerifier`] (how two embeddings are compared).
//! It is safe to share between threads behind an `Arc`.

mod storage;
pub mod verifier;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info};

use crate::faces::Embedding;
use storage::Storage;

pub use storage::StorageStrategy;
pub use verifier::{CosineVerifier, EuclideanVerifier, FeatureVerifier, VerifierKind};

/// Result of looking up the closest enrolled face
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// The closest entry is within the verifier's threshold
    Match {
        label: String,
        distance: f32,
        #[serde(skip)]
        embedding: Embedding,
    },
    /// The closest entry is too far away to be trusted
    NoConfidentMatch { nearest: String, distance: f32 },
    /// Nothing has been enrolled yet
    Empty,
}

impl MatchOutcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            MatchOutcome::Match { label, .. } => Some(label),
            _ => None,
        }
    }
}

pub struct FeatureBank {
    storage: RwLock<Storage>,
    verifier: Box<dyn FeatureVerifier>,
}

impl FeatureBank {
    pub fn new(strategy: StorageStrategy, verifier: Box<dyn FeatureVerifier>) -> Self {
        Self {
            storage: RwLock::new(Storage::new(strategy)),
            verifier,
        }
    }

    /// Enroll `embedding` under `label`.
    ///
    /// Returns `false` without touching the bank when either is empty.
    pub fn put(&self, label: &str, embedding: &[f32]) -> bool {
        if label.is_empty() || embedding.is_empty() {
            debug!(label, len = embedding.len(), "Ignoring empty label or embedding");
            return false;
        }

        self.write().insert(label, embedding.to_vec());
        debug!(label, "Enrolled embedding");
        true
    }

    /// Embedding enrolled under `label` (the first one for multi-vector banks)
    pub fn get(&self, label: &str) -> Option<Embedding> {
        self.read().get(label).cloned()
    }

    /// Find the enrolled embedding closest to `query`.
    ///
    /// Entries are scanned in insertion order; on equal distances the
    /// earlier entry wins.
    pub fn find_match(&self, query: &[f32]) -> MatchOutcome {
        let storage = self.read();

        let mut best: Option<(&str, &Embedding, f32)> = None;
        for (label, embedding) in storage.entries() {
            let distance = self.verifier.verify(embedding, query);
            debug!(label = %label, distance, verifier = self.verifier.name(), "Compared embedding");
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((label.as_str(), embedding, distance));
            }
        }

        let Some((label, embedding, distance)) = best else {
            return MatchOutcome::Empty;
        };

        if distance < self.verifier.threshold() {
            info!(label, distance, "Matched face");
            MatchOutcome::Match {
                label: label.to_string(),
                distance,
                embedding: embedding.clone(),
            }
        } else {
            info!(
                nearest = label,
                distance,
                threshold = self.verifier.threshold(),
                "Cannot recognize face, closest enrolled label rejected"
            );
            MatchOutcome::NoConfidentMatch {
                nearest: label.to_string(),
                distance,
            }
        }
    }

    /// Embedding enrolled under the matched label, if there is a confident match
    pub fn get_similar(&self, query: &[f32]) -> Option<Embedding> {
        match self.find_match(query) {
            MatchOutcome::Match { label, .. } => self.get(&label),
            _ => None,
        }
    }

    /// Number of stored embeddings
    pub fn len(&self) -> usize {
        self.read().entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct labels in first-enrolled order
    pub fn labels(&self) -> Vec<String> {
        self.read().labels()
    }

    pub fn strategy(&self) -> StorageStrategy {
        self.read().strategy()
    }

    pub fn verifier(&self) -> &dyn FeatureVerifier {
        self.verifier.as_ref()
    }

    fn read(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cosine_bank(strategy: StorageStrategy) -> FeatureBank {
        FeatureBank::new(strategy, Box::new(CosineVerifier::default()))
    }

    /// Unit vector at `distance` cosine distance from (1, 0).
    fn at_cosine_distance(distance: f32) -> Vec<f32> {
        let cos = 1.0 - distance;
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_match_below_threshold() {
        let bank = cosine_bank(StorageStrategy::Multi);
        bank.put("alice", &[1.0, 0.0]);

        match bank.find_match(&at_cosine_distance(0.35)) {
            MatchOutcome::Match { label, distance, .. } => {
                assert_eq!(label, "alice");
                assert!((distance - 0.35).abs() < 1e-4);
            }
            other => panic!("expected match, got {:?}", other),
        }
        assert_eq!(bank.get_similar(&at_cosine_distance(0.35)), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_no_confident_match_above_threshold() {
        let bank = cosine_bank(StorageStrategy::Multi);
        bank.put("alice", &[1.0, 0.0]);

        match bank.find_match(&at_cosine_distance(0.45)) {
            MatchOutcome::NoConfidentMatch { nearest, distance } => {
                assert_eq!(nearest, "alice");
                assert!((distance - 0.45).abs() < 1e-4);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(bank.get_similar(&at_cosine_distance(0.45)), None);
    }

    #[test]
    fn test_empty_bank() {
        let bank = cosine_bank(StorageStrategy::Single);
        assert_eq!(bank.find_match(&[1.0, 0.0]), MatchOutcome::Empty);
        assert!(bank.get_similar(&[1.0, 0.0]).is_none());
        assert!(bank.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        for strategy in [StorageStrategy::Multi, StorageStrategy::Single] {
            let bank = cosine_bank(strategy);
            assert!(bank.put("alice", &[0.1, 0.2, 0.3]));
            assert_eq!(bank.get("alice"), Some(vec![0.1, 0.2, 0.3]));
            assert_eq!(bank.get("bob"), None);
        }
    }

    #[test]
    fn test_absent_label_or_embedding_is_ignored() {
        let bank = cosine_bank(StorageStrategy::Multi);
        assert!(!bank.put("", &[1.0]));
        assert!(!bank.put("alice", &[]));
        assert!(bank.is_empty());
    }

    #[test]
    fn test_multi_returns_first_enrolled() {
        let bank = cosine_bank(StorageStrategy::Multi);
        bank.put("alice", &[1.0, 0.0]);
        bank.put("alice", &[0.9, 0.1]);

        assert_eq!(bank.len(), 2);
        assert_eq!(bank.labels(), vec!["alice"]);
        assert_eq!(bank.get("alice"), Some(vec![1.0, 0.0]));
        // the second entry is the closer one, but get_similar resolves by label
        assert_eq!(bank.get_similar(&[0.9, 0.1]), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_single_replaces() {
        let bank = cosine_bank(StorageStrategy::Single);
        bank.put("alice", &[1.0, 0.0]);
        bank.put("alice", &[0.0, 1.0]);

        assert_eq!(bank.len(), 1);
        assert_eq!(bank.get("alice"), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_tie_goes_to_first_scanned() {
        let bank = FeatureBank::new(StorageStrategy::Multi, Box::new(EuclideanVerifier::default()));
        bank.put("left", &[-1.0, 0.0]);
        bank.put("right", &[1.0, 0.0]);

        assert_eq!(bank.find_match(&[0.0, 0.0]).label(), Some("left"));
    }

    #[test]
    fn test_find_match_deterministic() {
        let bank = FeatureBank::new(StorageStrategy::Multi, Box::new(EuclideanVerifier::default()));
        bank.put("alice", &[0.0, 0.0, 1.0]);
        bank.put("bob", &[0.0, 1.0, 0.0]);
        bank.put("carol", &[1.0, 0.0, 0.0]);

        let query = [0.1, 0.8, 0.2];
        let first = bank.find_match(&query);
        for _ in 0..10 {
            assert_eq!(bank.find_match(&query), first);
        }
        assert_eq!(first.label(), Some("bob"));
    }

    #[test]
    fn test_mismatched_query_length_never_matches() {
        let bank = FeatureBank::new(StorageStrategy::Multi, Box::new(EuclideanVerifier::default()));
        bank.put("alice", &[0.0, 0.0]);
        assert!(matches!(
            bank.find_match(&[0.0, 0.0, 0.0]),
            MatchOutcome::NoConfidentMatch { .. }
        ));
    }

    #[test]
    fn test_concurrent_put_and_find() {
        let bank = Arc::new(FeatureBank::new(
            StorageStrategy::Multi,
            Box::new(EuclideanVerifier::default()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bank = bank.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        bank.put(&format!("person-{}", i), &[i as f32, j as f32]);
                        let _ = bank.find_match(&[i as f32, 0.0]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bank.len(), 400);
        assert_eq!(bank.labels().len(), 8);
        assert_eq!(bank.get("person-3"), Some(vec![3.0, 0.0]));
    }
}
