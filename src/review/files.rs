// src/review/files.rs
// Expands picked paths (files and folders) into readable uploads.

use bevy::log::warn;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::queue::{is_supported_image, UploadedImage};

/// Files are kept as given; folders are scanned recursively for supported
/// images in name order.
pub fn collect_image_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut in_dir: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(e) => Some(e),
                    Err(err) => {
                        warn!("Skipping unreadable entry under {}: {}", path.display(), err);
                        None
                    }
                })
                .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
                .map(|e| e.into_path())
                .collect();
            in_dir.sort();
            found.extend(in_dir);
        } else if is_supported_image(path) {
            found.push(path.clone());
        } else {
            warn!("Ignoring unsupported file {}", path.display());
        }
    }
    found
}

/// Reads every path; failures are returned alongside the successes.
pub fn load_uploads(paths: &[PathBuf]) -> (Vec<UploadedImage>, Vec<(PathBuf, std::io::Error)>) {
    let mut uploads = Vec::new();
    let mut failures = Vec::new();
    for path in collect_image_paths(paths) {
        match UploadedImage::from_path(&path) {
            Ok(upload) => uploads.push(upload),
            Err(e) => failures.push((path, e)),
        }
    }
    (uploads, failures)
}

pub fn display_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
