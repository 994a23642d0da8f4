//! Training set discovery.

pub mod discovery;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use discovery::{discover_images, label_for};

/// An image to enroll together with the identity it shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingImage {
    pub path: PathBuf,
    pub label: String,
}

/// Find every training image under `root`, labelled by the person folder
/// (`root/<label>/...`) it lives in.
///
/// Images directly inside `root` carry no label and are skipped with a warning.
pub fn discover_training_set(root: &Path, extensions: &[String]) -> Result<Vec<TrainingImage>> {
    let images = discover_images(root, extensions)?;
    let total = images.len();

    let set: Vec<TrainingImage> = images
        .into_iter()
        .filter_map(|path| match label_for(root, &path) {
            Some(label) => Some(TrainingImage { path, label }),
            None => {
                tracing::warn!(path = ?path, "Not inside a label directory, skipping");
                None
            }
        })
        .collect();

    tracing::debug!(root = ?root, found = total, usable = set.len(), "Discovered training images");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_training_set_labels() {
        let dir = tempdir().unwrap();
        for (person, file) in [("alice", "a1.jpg"), ("alice", "a2.jpg"), ("bob", "b1.png")] {
            fs::create_dir_all(dir.path().join(person)).unwrap();
            File::create(dir.path().join(person).join(file)).unwrap();
        }

        let extensions = ["jpg".to_string(), "png".to_string()];
        let set = discover_training_set(dir.path(), &extensions).unwrap();
        let labels: Vec<&str> = set.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["alice", "alice", "bob"]);
    }

    #[test]
    fn test_training_set_skips_root_files_and_labels_nested_by_person() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("alice/holiday")).unwrap();
        File::create(dir.path().join("alice/holiday/a.jpg")).unwrap();
        File::create(dir.path().join("stray.jpg")).unwrap();

        let set = discover_training_set(dir.path(), &["jpg".to_string()]).unwrap();
        assert_eq!(
            set,
            vec![TrainingImage {
                path: dir.path().join("alice/holiday/a.jpg"),
                label: "alice".to_string(),
            }]
        );
    }
}
