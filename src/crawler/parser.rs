//! Stock list parser
//!
//! This module turns a fetched stock list page into:
//! - The ordered listing summaries on the page
//! - The highest page number advertised by its pagination control

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

static REF_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([A-Za-z]{2}\d+)/id/\d+").expect("valid regex"));

static PAGE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"page=(\d+)").expect("valid regex"));

static PAGINATION_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)pagination|pager").expect("valid regex"));

static NEXT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)next|»").expect("valid regex"));

/// One vehicle on a stock list page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRef {
    /// Canonical (uppercase) reference number; empty when the link carries none
    pub identifier: String,

    /// Link text, may be empty
    pub title: String,

    pub detail_link: Url,
}

/// Extracts listings from an index page
///
/// Implementations never fail: markup they cannot understand yields an empty
/// sequence.
pub trait ListingExtractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &Url) -> Vec<ListingRef>;

    /// Highest page number the page links to, if it shows one
    fn total_pages(&self, _html: &str) -> Option<u32> {
        None
    }
}

/// Reference number embedded in a detail URL (`/toyota/hiace/cb761369/id/13824758/`)
pub fn identifier_from_url(url: &str) -> Option<String> {
    REF_IN_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// Extractor for the BE FORWARD stock list layout
///
/// # Link Rules
///
/// A link is a vehicle when its `href` contains `/id/` and has at least four
/// slashes. Links are resolved against the page URL and de-duplicated by
/// absolute URL, keeping first-seen order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StockListExtractor;

impl ListingExtractor for StockListExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> Vec<ListingRef> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut listings: Vec<ListingRef> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !href.contains("/id/") || href.matches('/').count() < 4 {
                continue;
            }
            let Some(detail_link) = resolve_link(href, page_url) else {
                continue;
            };

            let title = link_title(&element);
            let key = detail_link.to_string();

            // The same vehicle is often linked twice (photo and name); keep
            // the first position but take the first non-empty title
            if let Some(&index) = seen.get(&key) {
                if listings[index].title.is_empty() && !title.is_empty() {
                    listings[index].title = title;
                }
                continue;
            }

            let identifier = identifier_from_url(detail_link.as_str()).unwrap_or_default();
            seen.insert(key, listings.len());
            listings.push(ListingRef {
                identifier,
                title,
                detail_link,
            });
        }

        tracing::debug!("Found {} unique vehicle links on {}", listings.len(), page_url);
        listings
    }

    fn total_pages(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        let classed = Selector::parse("[class]").ok()?;
        let links = Selector::parse("a[href]").ok()?;

        let pagination = document.select(&classed).find(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| PAGINATION_CLASS.is_match(class))
        });

        if let Some(pagination) = pagination {
            let highest = pagination
                .select(&links)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(page_number)
                .max();
            if let Some(highest) = highest {
                return Some(highest.max(1));
            }
        }

        document
            .select(&links)
            .find(|a| NEXT_TEXT.is_match(&a.text().collect::<String>()))
            .and_then(|a| a.value().attr("href"))
            .and_then(page_number)
    }
}

fn page_number(href: &str) -> Option<u32> {
    PAGE_PARAM
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Trimmed link text, kept only when it looks like a vehicle name
fn link_title(element: &ElementRef<'_>) -> String {
    let text = element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.chars().count() > 5 && !text.chars().all(|c| c.is_ascii_digit()) {
        text
    } else {
        String::new()
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url)
        }
        _ => None,
    }
}
