//! Social post formatting and folder naming

use crate::config::PostConfig;
use crate::vehicle::{VehicleDetail, VehicleSpecs};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Photos attached to one post
pub const MAX_POST_IMAGES: usize = 10;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// Makes `name` safe to use as a folder or file name
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name, "");
    let joined = SEPARATORS.replace_all(&cleaned, "_");
    joined.trim_matches('_').to_string()
}

/// `YEAR_MAKE_MODEL_REF` from a title like "2019 TOYOTA LAND CRUISER ZX"
///
/// The year is only used when the first word is four digits.
pub fn folder_name(title: &str, ref_no: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();

    let year = words
        .first()
        .filter(|w| w.len() == 4 && w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| w.to_string());
    let make = words.get(1).map(|w| w.to_uppercase());
    let model = words.get(2).map(|w| w.to_uppercase());

    let parts: Vec<String> = [year, make, model, Some(ref_no.to_string())]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();

    sanitize_filename(&parts.join("_"))
}

fn has_token(text: &str, token: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == token)
}

/// Default hashtags plus the ones implied by drive, fuel and transmission
///
/// Returned sorted and without duplicates.
pub fn hashtags(specs: &VehicleSpecs, defaults: &[String]) -> Vec<String> {
    let mut tags: BTreeSet<String> = defaults.iter().cloned().collect();
    let mut add = |tag: &str| {
        tags.insert(tag.to_string());
    };

    let drive = specs.drive.as_deref().unwrap_or_default().to_lowercase();
    if drive.contains('4') || drive.contains("awd") {
        add("#4x4");
        add("#4WD");
    }

    let fuel = specs.fuel.as_deref().unwrap_or_default().to_lowercase();
    if fuel.contains("diesel") {
        add("#Diesel");
    }
    if fuel.contains("hybrid") {
        add("#Hybrid");
    }
    if fuel.contains("petrol") || fuel.contains("gasoline") {
        add("#Petrol");
    }

    let transmission = specs.transmission.as_deref().unwrap_or_default().to_lowercase();
    if transmission.contains("auto") || has_token(&transmission, "at") {
        add("#Automatic");
    }
    if transmission.contains("manual") || has_token(&transmission, "mt") {
        add("#Manual");
    }

    tags.into_iter().collect()
}

/// Headline, body and hashtags of a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    pub headline: String,
    pub body: String,
    pub hashtags: Vec<String>,
}

/// Post-ready description of one vehicle, written as `facebook.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub title: String,
    pub ref_no: String,
    pub price: String,
    pub location: String,
    pub post_content: PostContent,

    /// At most [`MAX_POST_IMAGES`] photo paths
    pub images: Vec<String>,
    pub vehicle_url: String,
    pub folder_name: String,
}

/// Builds the post for a processed vehicle
pub fn format_post(
    detail: &VehicleDetail,
    identifier: &str,
    folder_name: &str,
    images: &[impl AsRef<Path>],
    config: &PostConfig,
) -> SocialPost {
    let specs = &detail.specs;
    let headline = format!("🚗 FOR SALE: {}", detail.title);

    let location = specs.location.clone().unwrap_or_default();
    let price = detail.price.clone().unwrap_or_default();

    let mut lines = Vec::new();
    if !location.is_empty() {
        match config.location_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => {
                lines.push(format!("📍 Location: {location}, {suffix}"))
            }
            _ => lines.push(format!("📍 Location: {location}")),
        }
    }
    if !price.is_empty() {
        lines.push(format!("💰 Price: {price}"));
    }
    if let Some(mileage) = &specs.mileage {
        lines.push(format!("📏 Mileage: {mileage}"));
    }
    match (&specs.engine_size, &specs.fuel) {
        (Some(size), Some(fuel)) => lines.push(format!("⚙️ Engine: {size} {fuel}")),
        (Some(size), None) => lines.push(format!("⚙️ Engine: {size}")),
        _ => {}
    }
    if let Some(transmission) = &specs.transmission {
        lines.push(format!("🔄 Transmission: {transmission}"));
    }
    if let Some(drive) = &specs.drive {
        lines.push(format!("🚗 Drive: {drive}"));
    }

    let extra: Vec<String> = [
        ("Seats", &specs.seats),
        ("Doors", &specs.doors),
        ("Steering", &specs.steering),
        ("Color", &specs.ext_color),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.as_ref().map(|v| format!("• {label}: {v}")))
    .collect();

    let tags = hashtags(specs, &config.hashtags);

    let mut body = format!("{headline}\n\n{}\n\n{}", config.intro, lines.join("\n"));
    if !extra.is_empty() {
        body.push_str("\n\nSpecs:\n");
        body.push_str(&extra.join("\n"));
    }
    body.push_str(&format!(
        "\n\nDM for inquiries! 📞\n\n{}",
        detail.detail_url
    ));
    body.push_str("\n\n");
    body.push_str(&tags.join(" "));

    SocialPost {
        title: detail.title.clone(),
        ref_no: identifier.to_string(),
        price,
        location,
        post_content: PostContent {
            headline,
            body: body.trim().to_string(),
            hashtags: tags,
        },
        images: images
            .iter()
            .take(MAX_POST_IMAGES)
            .map(|p| p.as_ref().display().to_string())
            .collect(),
        vehicle_url: detail.detail_url.to_string(),
        folder_name: folder_name.to_string(),
    }
}
