//! Saving resolved images to disk.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::fetch::Fetcher;
use crate::resolver::ResolvedImage;
use crate::sanitize::unix_timestamp;
use crate::{PicgrabError, Result};

/// Downloads `image` to its target path and returns where it was written.
///
/// The target directory is created if needed. An existing file is never
/// overwritten: the new file gets `_<unix time>` appended to its name.
///
/// # Errors
///
/// Returns [`PicgrabError::FetchFailed`] if the image could not be fetched
/// and [`PicgrabError::WriteError`] if it could not be written.
pub async fn save_image<F: Fetcher>(fetcher: &F, image: &ResolvedImage) -> Result<PathBuf> {
    let bytes = fetcher
        .fetch_bytes(&image.image_url)
        .await
        .ok_or_else(|| PicgrabError::FetchFailed(image.image_url.clone()))?;

    if let Some(directory) = image.target_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(directory)?;
    }

    let target = write_new_file(&image.target_path, &bytes)?;

    info!(path = %target.display(), bytes = bytes.len(), "saved image");
    Ok(target)
}

/// Saves every image of one resolution in order, reporting each outcome.
pub async fn save_all<F: Fetcher>(fetcher: &F, images: &[ResolvedImage]) -> Vec<Result<PathBuf>> {
    let mut results = Vec::with_capacity(images.len());
    for image in images {
        results.push(save_image(fetcher, image).await);
    }
    results
}

/// Writes `bytes` to `path`, or to `path` with `_<unix time>` (then
/// `_<unix time>_<n>`) inserted before the extension if that name is taken.
///
/// Files are created with `create_new`, so a name claimed concurrently by
/// another writer is skipped rather than overwritten.
pub fn write_new_file(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let timestamp = unix_timestamp();
    let mut attempt = 0;
    loop {
        let candidate = match attempt {
            0 => path.to_path_buf(),
            1 => with_suffix(path, &timestamp),
            n => with_suffix(path, &format!("{timestamp}_{}", n - 1)),
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(bytes)?;
                if attempt > 0 {
                    debug!(original = %path.display(), renamed = %candidate.display(), "target exists");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{stem}_{suffix}.{}", extension.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}
