//! Vehicle extraction, photos and post formatting
//!
//! This module turns one detail page into a [`VehicleRecord`]:
//! - `detail`: specification table, title, price and photo links
//! - `images`: photo retrieval, archive extraction and bottom cropping
//! - `post`: folder naming, hashtags and the social post body

mod detail;
mod images;
mod post;

pub use detail::{
    BeForwardDetailExtractor, DetailExtractor, ExtractError, VehicleDetail, VehicleSpecs,
    SPEC_LABELS, SPEC_SCHEMA_VERSION,
};
pub use images::{
    crop_bottom, crop_pixels, extract_archive, ImageError, ImagePipeline, MAX_CROP_PERCENTAGE,
    MIN_CROP_PIXELS,
};
pub use post::{
    folder_name, format_post, hashtags, sanitize_filename, PostContent, SocialPost,
    MAX_POST_IMAGES,
};

use std::path::PathBuf;

/// Everything produced for one vehicle before it is persisted
#[derive(Debug, Clone)]
pub struct VehicleRecord {
    /// Canonical identifier that will be committed
    pub identifier: String,
    pub detail: VehicleDetail,
    pub folder_name: String,

    /// Retrieved photos, sorted
    pub images: Vec<PathBuf>,
    pub post: SocialPost,
}
