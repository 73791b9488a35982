// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input discovery: turn a file or folder of scans into batch inputs.

use std::path::{Path, PathBuf};

use markwerk_core::error::{OmrError, Result};
use markwerk_grading::SheetInput;
use tracing::{debug, warn};

/// Extensions recognised as scan images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Student id for a scan: its file name without extension.
pub fn student_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".into())
}

/// List the scans to grade. A file is taken as is; a folder contributes its
/// image files (not recursively), sorted by path.
pub fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(input)?;
    if meta.is_file() {
        if !is_image(input) {
            return Err(OmrError::Config(format!(
                "{} is not an image file (expected one of: {})",
                input.display(),
                IMAGE_EXTENSIONS.join(", ")
            )));
        }
        return Ok(vec![input.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-image entry");
        }
    }
    paths.sort();

    if paths.is_empty() {
        warn!(input = %input.display(), "No scan images found");
    }
    Ok(paths)
}

/// Batch inputs for the scans, in path order. Nothing is read here: each
/// worker reads and decodes its own file.
pub fn sheets(paths: Vec<PathBuf>) -> impl Iterator<Item = SheetInput> {
    paths
        .into_iter()
        .map(|path| SheetInput::file(student_id(&path), path))
}
