//! Photo retrieval and watermark cropping
//!
//! Photos land in `<vehicle dir>/images/`. In individual mode each gallery
//! photo is downloaded as `<folder>_NNN.<ext>`; in zip mode the archive is
//! downloaded into memory and its entries are written out by file name.
//! Cropping removes the watermark strip at the bottom of each photo.

use crate::config::{ImageConfig, ImageMode};
use crate::crawler::PageFetcher;
use crate::vehicle::VehicleDetail;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Never crop fewer pixels than this
pub const MIN_CROP_PIXELS: u32 = 10;

/// Never crop more than this share of the height (percent)
pub const MAX_CROP_PERCENTAGE: u32 = 15;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Image too small to crop: {height}px high")]
    TooSmall { height: u32 },
}

/// Extension for a downloaded photo, taken from its URL
fn extension_for(url: &Url) -> &'static str {
    let lower = url.as_str().to_lowercase();
    if lower.contains(".png") {
        "png"
    } else if lower.contains(".jpeg") {
        "jpeg"
    } else {
        "jpg"
    }
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

/// Pixels removed from the bottom of an image `height` pixels high
pub fn crop_pixels(height: u32, percentage: u32) -> u32 {
    let requested = (u64::from(height) * u64::from(percentage) / 100) as u32;
    let ceiling = (u64::from(height) * u64::from(MAX_CROP_PERCENTAGE) / 100) as u32;
    if requested < MIN_CROP_PIXELS {
        MIN_CROP_PIXELS
    } else if requested > ceiling {
        ceiling
    } else {
        requested
    }
}

/// Crops the bottom `percentage` of the image at `path` in place
///
/// The file is only replaced once the cropped image has been fully encoded, so
/// a failure leaves the original untouched.
pub fn crop_bottom(path: &Path, percentage: u32, quality: u8) -> Result<(), ImageError> {
    let img = image::open(path)?;
    let (width, height) = img.dimensions();

    let remove = crop_pixels(height, percentage);
    if remove >= height {
        return Err(ImageError::TooSmall { height });
    }
    let cropped = img.crop_imm(0, 0, width, height - remove);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;

    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false);

    if is_jpeg {
        let rgb = DynamicImage::ImageRgb8(cropped.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut temp, quality))?;
    } else {
        let format = image::ImageFormat::from_path(path)?;
        let mut buffer = Cursor::new(Vec::new());
        cropped.write_to(&mut buffer, format)?;
        temp.write_all(buffer.get_ref())?;
    }

    temp.flush()?;
    temp.persist(path).map_err(|e| ImageError::Io(e.error))?;

    tracing::debug!("Cropped {}px from bottom: {}", remove, path.display());
    Ok(())
}

/// Downloads and post-processes vehicle photos
pub struct ImagePipeline {
    fetcher: Arc<dyn PageFetcher>,
    config: ImageConfig,
}

impl ImagePipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: ImageConfig) -> Self {
        Self { fetcher, config }
    }

    /// Retrieves the photos of `detail` into `<vehicle_dir>/images/`
    ///
    /// # Arguments
    ///
    /// * `detail` - Source of the photo and archive URLs
    /// * `vehicle_dir` - Vehicle output folder; its name prefixes photo files
    /// * `mode` - Individual downloads or the archive
    /// * `crop` - Whether to crop the watermark off each stored photo
    ///
    /// # Returns
    ///
    /// Sorted paths of the stored photos. Photos that fail to download are
    /// skipped; an unusable archive falls back to individual downloads.
    pub async fn retrieve(
        &self,
        detail: &VehicleDetail,
        vehicle_dir: &Path,
        mode: ImageMode,
        crop: bool,
    ) -> Result<Vec<PathBuf>, ImageError> {
        let images_dir = vehicle_dir.join("images");
        tokio::fs::create_dir_all(&images_dir).await?;

        let folder_name = vehicle_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vehicle".to_string());

        let mut stored = match (mode, &detail.archive_url) {
            (ImageMode::Zip, Some(archive_url)) => {
                match self.download_archive(archive_url, &images_dir).await {
                    Ok(files) => files,
                    Err(e) => {
                        tracing::warn!(
                            "Archive download failed ({}), falling back to individual photos",
                            e
                        );
                        self.download_individual(detail, &images_dir, &folder_name)
                            .await?
                    }
                }
            }
            (ImageMode::Zip, None) => {
                tracing::info!("No image archive offered, downloading photos individually");
                self.download_individual(detail, &images_dir, &folder_name)
                    .await?
            }
            (ImageMode::Individual, _) => {
                self.download_individual(detail, &images_dir, &folder_name)
                    .await?
            }
        };

        if crop && self.config.crop_percentage > 0 {
            let photos: Vec<PathBuf> = stored.iter().filter(|p| is_photo(p)).cloned().collect();
            let (percentage, quality) = (self.config.crop_percentage, self.config.crop_quality);
            tokio::task::spawn_blocking(move || {
                for path in &photos {
                    if let Err(e) = crop_bottom(path, percentage, quality) {
                        tracing::warn!("Could not crop {}: {}", path.display(), e);
                    }
                }
            })
            .await?;
        }

        stored.sort();
        tracing::info!(
            "Stored {} photos for {} ({} mode)",
            stored.len(),
            folder_name,
            mode
        );
        Ok(stored)
    }

    async fn download_individual(
        &self,
        detail: &VehicleDetail,
        images_dir: &Path,
        folder_name: &str,
    ) -> Result<Vec<PathBuf>, ImageError> {
        if detail.photo_urls.is_empty() {
            tracing::warn!("No photo URLs for {}", detail.detail_url);
            return Ok(Vec::new());
        }

        let mut stored = Vec::with_capacity(detail.photo_urls.len());
        for (i, url) in detail.photo_urls.iter().enumerate() {
            let Some(bytes) = self.fetcher.fetch_bytes(url).await else {
                tracing::warn!("Skipping photo {}", url);
                continue;
            };
            let path = images_dir.join(format!(
                "{}_{:03}.{}",
                folder_name,
                i + 1,
                extension_for(url)
            ));
            tokio::fs::write(&path, &bytes).await?;
            stored.push(path);
        }

        tracing::info!(
            "Downloaded {}/{} photos",
            stored.len(),
            detail.photo_urls.len()
        );
        Ok(stored)
    }

    async fn download_archive(
        &self,
        archive_url: &Url,
        images_dir: &Path,
    ) -> Result<Vec<PathBuf>, ImageError> {
        let bytes = self.fetcher.fetch_bytes(archive_url).await.ok_or_else(|| {
            ImageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("could not download {archive_url}"),
            ))
        })?;
        let images_dir = images_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&bytes, &images_dir)).await?
    }
}

/// Writes the files of a zip archive into `images_dir`
///
/// Directory entries, entries whose path has a component starting with `_` or
/// `.` (such as `__MACOSX/`), and entries that would escape the target
/// directory are skipped. Entries are flattened to their file name.
pub fn extract_archive(bytes: &[u8], images_dir: &Path) -> Result<Vec<PathBuf>, ImageError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut stored = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };

        let hidden = relative.components().any(|c| match c {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                part.starts_with('_') || part.starts_with('.')
            }
            _ => true,
        });
        if hidden {
            continue;
        }

        let Some(file_name) = relative.file_name() else {
            continue;
        };
        let target = images_dir.join(file_name);
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        stored.push(target);
    }

    tracing::info!("Extracted {} files from archive", stored.len());
    Ok(stored)
}
