use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::faces::Embedding;

/// How a bank keeps embeddings per label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStrategy {
    /// Every enrolled embedding is kept; a label may appear many times
    Multi,
    /// One embedding per label; re-enrolling replaces it
    Single,
}

/// Embedding storage, scanned in insertion order.
#[derive(Debug)]
pub(crate) enum Storage {
    Multi(Vec<(String, Embedding)>),
    Single {
        entries: Vec<(String, Embedding)>,
        index: HashMap<String, usize>,
    },
}

impl Storage {
    pub fn new(strategy: StorageStrategy) -> Self {
        match strategy {
            StorageStrategy::Multi => Storage::Multi(Vec::new()),
            StorageStrategy::Single => Storage::Single {
                entries: Vec::new(),
                index: HashMap::new(),
            },
        }
    }

    pub fn strategy(&self) -> StorageStrategy {
        match self {
            Storage::Multi(_) => StorageStrategy::Multi,
            Storage::Single { .. } => StorageStrategy::Single,
        }
    }

    /// Store an embedding. A replaced label keeps its original position.
    pub fn insert(&mut self, label: &str, embedding: Embedding) {
        match self {
            Storage::Multi(entries) => entries.push((label.to_string(), embedding)),
            Storage::Single { entries, index } => match index.get(label) {
                Some(&i) => entries[i].1 = embedding,
                None => {
                    index.insert(label.to_string(), entries.len());
                    entries.push((label.to_string(), embedding));
                }
            },
        }
    }

    /// First embedding stored under `label`
    pub fn get(&self, label: &str) -> Option<&Embedding> {
        match self {
            Storage::Multi(entries) => entries.iter().find(|(l, _)| l == label).map(|(_, e)| e),
            Storage::Single { entries, index } => index.get(label).map(|&i| &entries[i].1),
        }
    }

    pub fn entries(&self) -> &[(String, Embedding)] {
        match self {
            Storage::Multi(entries) => entries,
            Storage::Single { entries, .. } => entries,
        }
    }

    /// Distinct labels in first-enrolled order
    pub fn labels(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        self.entries()
            .iter()
            .map(|(label, _)| label.as_str())
            .filter(|label| seen.insert(*label))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_keeps_every_embedding() {
        let mut storage = Storage::new(StorageStrategy::Multi);
        storage.insert("alice", vec![1.0]);
        storage.insert("bob", vec![2.0]);
        storage.insert("alice", vec![3.0]);

        assert_eq!(storage.entries().len(), 3);
        assert_eq!(storage.get("alice"), Some(&vec![1.0]));
        assert_eq!(storage.labels(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_labels_in_first_enrolled_order() {
        let mut storage = Storage::new(StorageStrategy::Multi);
        for i in 0..3000 {
            storage.insert(&format!("person{}", (i * 7) % 1000), vec![i as f32]);
        }

        let labels = storage.labels();
        assert_eq!(labels.len(), 1000);
        assert_eq!(&labels[..3], &["person0", "person7", "person14"]);
        assert_eq!(storage.entries().len(), 3000);
    }

    #[test]
    fn test_single_upserts_in_place() {
        let mut storage = Storage::new(StorageStrategy::Single);
        storage.insert("alice", vec![1.0]);
        storage.insert("bob", vec![2.0]);
        storage.insert("alice", vec![3.0]);

        assert_eq!(storage.entries().len(), 2);
        assert_eq!(storage.get("alice"), Some(&vec![3.0]));
        assert_eq!(storage.entries()[0].0, "alice");
        assert_eq!(storage.strategy(), StorageStrategy::Single);
    }

    #[test]
    fn test_unknown_label() {
        for strategy in [StorageStrategy::Multi, StorageStrategy::Single] {
            assert!(Storage::new(strategy).get("nobody").is_none());
        }
    }
}
