//! Media staging: downloading remote media to a temp file before a
//! platform upload.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::PlatformError;
use uuid::Uuid;

/// A downloaded media file in the system temp directory.
///
/// The file is removed on drop, so it survives no longer than the
/// publish unit that staged it, including on error paths.
#[derive(Debug)]
pub struct TempMedia {
    path: PathBuf,
}

impl TempMedia {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempMedia {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temp media file");
            }
        }
    }
}

/// Pick a file extension from the media URL. Video container suffixes
/// map to mp4, anything else is treated as an image.
pub fn media_extension(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    let path = lower.split('?').next().unwrap_or(&lower);
    if [".mp4", ".mov", ".avi", ".mkv"]
        .iter()
        .any(|ext| path.ends_with(ext))
    {
        "mp4"
    } else {
        "jpg"
    }
}

/// Download `url` to a fresh temp file with the given extension.
pub async fn download(
    http: &reqwest::Client,
    url: &str,
    extension: &str,
) -> Result<TempMedia, PlatformError> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(PlatformError::Media(format!(
            "Failed to download media from {}: HTTP {}",
            url,
            response.status().as_u16()
        )));
    }

    let bytes = response.bytes().await?;
    let path = std::env::temp_dir().join(format!("crosspost-{}.{}", Uuid::new_v4(), extension));
    std::fs::write(&path, &bytes)
        .map_err(|e| PlatformError::Media(format!("Failed to stage media file: {}", e)))?;

    Ok(TempMedia { path })
}
