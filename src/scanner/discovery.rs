use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FaceError, Result};

/// Recursively collect files under `directory` whose extension is in
/// `extensions` (case-insensitive), sorted by path.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(FaceError::InvalidInput(format!(
            "not a directory: {}",
            directory.display()
        )));
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(directory).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_file() && has_extension(path, extensions) {
            images.push(path.to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        })
        .unwrap_or(false)
}

/// Identity label of a training image: the first directory below `root`.
///
/// Images sitting directly in `root` have no label. Deeper images belong to
/// the person folder they are nested in.
pub fn label_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    components.next()?;

    let label = first.as_os_str().to_string_lossy().to_string();
    (!label.is_empty()).then_some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_images() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("document.txt")).unwrap();

        fs::create_dir(dir.path().join("subdir")).unwrap();
        File::create(dir.path().join("subdir/photo3.jpeg")).unwrap();
        fs::create_dir(dir.path().join("folder.jpg")).unwrap();

        let extensions = vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()];
        let images = discover_images(dir.path(), &extensions).unwrap();

        assert_eq!(images.len(), 3);
        assert!(images.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_discover_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover_images(&missing, &["jpg".to_string()]),
            Err(FaceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_label_is_first_directory_under_root() {
        let root = Path::new("/data/train");
        assert_eq!(
            label_for(root, Path::new("/data/train/alice/01.jpg")),
            Some("alice".to_string())
        );
        assert_eq!(
            label_for(root, Path::new("/data/train/alice/holiday/02.jpg")),
            Some("alice".to_string())
        );
        assert_eq!(label_for(root, Path::new("/data/train/01.jpg")), None);
        assert_eq!(label_for(root, Path::new("/elsewhere/bob/01.jpg")), None);
    }
}
