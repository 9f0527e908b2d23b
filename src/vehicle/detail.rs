//! Vehicle detail page extraction
//!
//! Turns a detail page into a [`VehicleDetail`]: the specification table, the
//! photo gallery, the "download all images" archive link, the page title and
//! the price.

use crate::crawler::{identifier_from_url, resolve_link};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Version of the [`VehicleSpecs`] field set, written into `data.json`
pub const SPEC_SCHEMA_VERSION: u32 = 1;

/// Specification table labels, in the order the site lists them
pub const SPEC_LABELS: [&str; 15] = [
    "Ref. No.",
    "Mileage",
    "Chassis No.",
    "Engine Code",
    "Model Code",
    "Steering",
    "Engine Size",
    "Ext. Color",
    "Location",
    "Fuel",
    "Version/Class",
    "Seats",
    "Drive",
    "Doors",
    "Transmission",
];

static IMAGE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif)").expect("valid regex"));
static GALLERY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)gallery|images|vehicle-images").expect("valid regex"));
static GALLERY_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ad-gallery|vehicle-gallery").expect("valid regex"));
static ARCHIVE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)download.*all.*images").expect("valid regex"));
static ARCHIVE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)download.*zip|download.*all").expect("valid regex"));
static ZIP_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.zip$").expect("valid regex"));
static IMAGE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)image|photo|picture").expect("valid regex"));
static PRICE_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)price").expect("valid regex"));

/// Fixed set of specification fields
///
/// Each field is filled from the row whose label appears in [`SPEC_LABELS`];
/// labels outside that table are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSpecs {
    pub ref_no: Option<String>,
    pub mileage: Option<String>,
    pub chassis_no: Option<String>,
    pub engine_code: Option<String>,
    pub model_code: Option<String>,
    pub steering: Option<String>,
    pub engine_size: Option<String>,
    pub ext_color: Option<String>,
    pub location: Option<String>,
    pub fuel: Option<String>,
    pub version_class: Option<String>,
    pub seats: Option<String>,
    pub drive: Option<String>,
    pub doors: Option<String>,
    pub transmission: Option<String>,
}

impl VehicleSpecs {
    fn field_mut(&mut self, label: &str) -> Option<&mut Option<String>> {
        let field = match label {
            "Ref. No." => &mut self.ref_no,
            "Mileage" => &mut self.mileage,
            "Chassis No." => &mut self.chassis_no,
            "Engine Code" => &mut self.engine_code,
            "Model Code" => &mut self.model_code,
            "Steering" => &mut self.steering,
            "Engine Size" => &mut self.engine_size,
            "Ext. Color" => &mut self.ext_color,
            "Location" => &mut self.location,
            "Fuel" => &mut self.fuel,
            "Version/Class" => &mut self.version_class,
            "Seats" => &mut self.seats,
            "Drive" => &mut self.drive,
            "Doors" => &mut self.doors,
            "Transmission" => &mut self.transmission,
            _ => return None,
        };
        Some(field)
    }

    /// Stores `value` under the field mapped to `label`
    ///
    /// Returns false for unknown labels. Empty values leave the field unset.
    pub fn set(&mut self, label: &str, value: &str) -> bool {
        let value = value.trim();
        match self.field_mut(label.trim()) {
            Some(field) => {
                if !value.is_empty() {
                    *field = Some(value.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Canonical reference number, if the table had one
    pub fn identifier(&self) -> Option<String> {
        self.ref_no
            .as_deref()
            .map(crate::state::canonical_identifier)
            .filter(|id| !id.is_empty())
    }
}

/// Everything read from one detail page
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleDetail {
    pub detail_url: Url,
    pub title: String,
    pub price: Option<String>,
    pub specs: VehicleSpecs,

    /// Full-size photo URLs in gallery order, without duplicates
    pub photo_urls: Vec<Url>,

    /// "Download all images" archive, when the page offers one
    pub archive_url: Option<Url>,
}

impl VehicleDetail {
    /// Reference number from the spec table, falling back to the URL
    pub fn identifier(&self) -> Option<String> {
        self.specs
            .identifier()
            .or_else(|| identifier_from_url(self.detail_url.as_str()))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{url} has neither a specification table nor photos")]
    NotADetailPage { url: String },
}

/// Extracts a [`VehicleDetail`] from detail page HTML
pub trait DetailExtractor: Send + Sync {
    fn extract(&self, html: &str, detail_url: &Url) -> Result<VehicleDetail, ExtractError>;
}

/// Extractor for the BE FORWARD detail page layout
#[derive(Debug, Default, Clone, Copy)]
pub struct BeForwardDetailExtractor;

impl DetailExtractor for BeForwardDetailExtractor {
    fn extract(&self, html: &str, detail_url: &Url) -> Result<VehicleDetail, ExtractError> {
        let document = Html::parse_document(html);

        let (specs, has_table) = extract_specs(&document);
        let photo_urls = extract_photo_urls(&document, detail_url);

        if !has_table && photo_urls.is_empty() {
            return Err(ExtractError::NotADetailPage {
                url: detail_url.to_string(),
            });
        }

        let archive_url = extract_archive_url(&document, detail_url);
        let price = extract_price(&document);

        let fallback_ref = specs
            .identifier()
            .or_else(|| identifier_from_url(detail_url.as_str()))
            .unwrap_or_default();
        let title = extract_title(&document).unwrap_or_else(|| {
            format!("Vehicle {fallback_ref}").trim().to_string()
        });

        tracing::debug!(
            "Extracted {} photos from {} (archive: {})",
            photo_urls.len(),
            detail_url,
            archive_url.is_some()
        );

        Ok(VehicleDetail {
            detail_url: detail_url.clone(),
            title,
            price,
            specs,
            photo_urls,
            archive_url,
        })
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads `table.specification`, taking each row's cells as (label, value) pairs
fn extract_specs(document: &Html) -> (VehicleSpecs, bool) {
    let mut specs = VehicleSpecs::default();
    let (Some(table_sel), Some(row_sel), Some(cell_sel)) = (
        selector("table.specification"),
        selector("tr"),
        selector("th, td"),
    ) else {
        return (specs, false);
    };

    let Some(table) = document.select(&table_sel).next() else {
        return (specs, false);
    };

    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
        for pair in cells.chunks_exact(2) {
            specs.set(&pair[0], &pair[1]);
        }
    }

    (specs, true)
}

fn large_photo_url(href: &str, base: &Url) -> Option<Url> {
    let resolved = resolve_link(href, base)?;
    Url::parse(&resolved.as_str().replace("/small/", "/large/")).ok()
}

fn push_unique(urls: &mut Vec<Url>, url: Url) {
    if !urls.contains(&url) {
        urls.push(url);
    }
}

fn extract_photo_urls(document: &Html, base: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    let gallery = selector("[id]").and_then(|sel| {
        document.select(&sel).find(|el| {
            el.value()
                .attr("id")
                .is_some_and(|id| GALLERY_ID.is_match(id))
        })
    });

    if let (Some(gallery), Some(links)) = (gallery, selector("a[href]")) {
        for link in gallery.select(&links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !IMAGE_HREF.is_match(href) {
                continue;
            }
            if let Some(url) = large_photo_url(href, base) {
                push_unique(&mut urls, url);
            }
        }
    }

    if !urls.is_empty() {
        return urls;
    }

    let gallery = selector("[class]").and_then(|sel| {
        document.select(&sel).find(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| GALLERY_CLASS.is_match(class))
        })
    });

    if let (Some(gallery), Some(images)) = (gallery, selector("img[src]")) {
        for img in gallery.select(&images) {
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if !IMAGE_HREF.is_match(src) {
                continue;
            }
            if let Some(url) = large_photo_url(src, base) {
                push_unique(&mut urls, url);
            }
        }
    }

    urls
}

fn extract_archive_url(document: &Html, base: &Url) -> Option<Url> {
    let links = selector("a[href]")?;
    let href_of = |a: ElementRef<'_>| {
        a.value()
            .attr("href")
            .and_then(|href| resolve_link(href, base))
    };

    if let Some(url) = document
        .select(&links)
        .find(|a| ARCHIVE_TEXT.is_match(&element_text(a)))
        .and_then(href_of)
    {
        return Some(url);
    }

    if let Some(url) = document
        .select(&links)
        .find(|a| {
            a.value()
                .attr("class")
                .is_some_and(|class| ARCHIVE_CLASS.is_match(class))
        })
        .and_then(href_of)
    {
        return Some(url);
    }

    document
        .select(&links)
        .filter(|a| a.value().attr("href").is_some_and(|h| ZIP_HREF.is_match(h)))
        .filter_map(href_of)
        .find(|url| IMAGE_WORDS.is_match(url.as_str()))
}

/// `<title>` up to the first `-`, so "2019 TOYOTA HIACE - BE FORWARD" becomes
/// "2019 TOYOTA HIACE"
fn extract_title(document: &Html) -> Option<String> {
    let sel = selector("title")?;
    let raw = document.select(&sel).next().map(|t| element_text(&t))?;
    let title = raw.split('-').next().unwrap_or_default().trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn extract_price(document: &Html) -> Option<String> {
    let sel = selector("span[class]")?;
    document
        .select(&sel)
        .find(|span| {
            span.value()
                .attr("class")
                .is_some_and(|class| PRICE_CLASS.is_match(class))
        })
        .map(|span| element_text(&span))
        .filter(|price| !price.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_url() -> Url {
        Url::parse("https://www.beforward.jp/toyota/land-cruiser/cb761369/id/13824758/").unwrap()
    }

    const DETAIL_PAGE: &str = r#"
        <html>
        <head><title>2019 TOYOTA LAND CRUISER ZX - BE FORWARD</title></head>
        <body>
          <span class="vehicle-price">US$ 45,000</span>
          <div id="gallery">
            <a href="/photos/small/cb761369_01.jpg"><img src="/thumb/1.jpg"></a>
            <a href="/photos/small/cb761369_02.JPG"><img src="/thumb/2.jpg"></a>
            <a href="/photos/small/cb761369_01.jpg">again</a>
            <a href="/stock/other">not a photo</a>
          </div>
          <a href="/download/cb761369_images.zip">Download all images</a>
          <table class="specification">
            <tr><th>Ref. No.</th><td>cb761369</td><th>Mileage</th><td>12,000 km</td></tr>
            <tr><th>Drive</th><td>4wheel drive</td><th>Fuel</th><td>Diesel</td></tr>
            <tr><th>Transmission</th><td>Automatic</td><th>Mystery</th><td>??</td></tr>
            <tr><th>Seats</th></tr>
          </table>
        </body>
        </html>
    "#;

    #[test]
    fn test_extracts_specs_from_pairs() {
        let detail = BeForwardDetailExtractor
            .extract(DETAIL_PAGE, &detail_url())
            .unwrap();
        assert_eq!(detail.specs.ref_no.as_deref(), Some("cb761369"));
        assert_eq!(detail.specs.mileage.as_deref(), Some("12,000 km"));
        assert_eq!(detail.specs.drive.as_deref(), Some("4wheel drive"));
        assert_eq!(detail.specs.fuel.as_deref(), Some("Diesel"));
        assert_eq!(detail.specs.transmission.as_deref(), Some("Automatic"));
        assert!(detail.specs.seats.is_none());
        assert_eq!(detail.identifier().as_deref(), Some("CB761369"));
    }

    #[test]
    fn test_photo_urls_are_large_and_unique() {
        let detail = BeForwardDetailExtractor
            .extract(DETAIL_PAGE, &detail_url())
            .unwrap();
        let photos: Vec<_> = detail.photo_urls.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            photos,
            vec![
                "https://www.beforward.jp/photos/large/cb761369_01.jpg",
                "https://www.beforward.jp/photos/large/cb761369_02.JPG",
            ]
        );
    }

    #[test]
    fn test_title_price_and_archive() {
        let detail = BeForwardDetailExtractor
            .extract(DETAIL_PAGE, &detail_url())
            .unwrap();
        assert_eq!(detail.title, "2019 TOYOTA LAND CRUISER ZX");
        assert_eq!(detail.price.as_deref(), Some("US$ 45,000"));
        assert_eq!(
            detail.archive_url.unwrap().as_str(),
            "https://www.beforward.jp/download/cb761369_images.zip"
        );
    }

    #[test]
    fn test_fallback_gallery_by_class() {
        let html = r#"
            <div class="ad-gallery">
              <img src="/img/small/a.png"><img src="/img/small/b.gif"><img src="/icon.svg">
            </div>"#;
        let detail = BeForwardDetailExtractor.extract(html, &detail_url()).unwrap();
        assert_eq!(detail.photo_urls.len(), 2);
        assert!(detail.photo_urls[0].as_str().ends_with("/img/large/a.png"));
        assert!(detail.archive_url.is_none());
        // No table: title falls back to the reference from the URL
        assert_eq!(detail.title, "Vehicle CB761369");
    }

    #[test]
    fn test_archive_from_zip_link() {
        let html = r#"
            <table class="specification"><tr><td>Ref. No.</td><td>AB1</td></tr></table>
            <a href="/files/manual.zip">Manual</a>
            <a href="/files/photo_pack.zip">Pack</a>"#;
        let detail = BeForwardDetailExtractor.extract(html, &detail_url()).unwrap();
        assert_eq!(
            detail.archive_url.unwrap().as_str(),
            "https://www.beforward.jp/files/photo_pack.zip"
        );
    }

    #[test]
    fn test_not_a_detail_page() {
        let result = BeForwardDetailExtractor.extract("<html><p>Sold out</p></html>", &detail_url());
        assert!(matches!(result, Err(ExtractError::NotADetailPage { .. })));
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let mut specs = VehicleSpecs::default();
        assert!(!specs.set("Colour Code", "1F7"));
        assert!(specs.set(" Ext. Color ", " Silver "));
        assert_eq!(specs.ext_color.as_deref(), Some("Silver"));
        assert_eq!(SPEC_LABELS.len(), 15);
        for label in SPEC_LABELS {
            assert!(VehicleSpecs::default().set(label, "x"), "{label} is mapped");
        }
    }
}
