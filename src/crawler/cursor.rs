//! Crawl cursor
//!
//! Walks the stock list from page 1 and returns the first listing whose
//! identifier is not in the processed set. The walk is stateless: the
//! processed set alone decides where it stops, so a restart after any failure
//! resumes exactly where the last commit left off.

use crate::config::SiteConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::parser::{ListingExtractor, ListingRef};
use crate::state::canonical_identifier;
use crate::ConfigError;
use serde::Serialize;
use std::collections::HashSet;

/// Why the walk ended without a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// A fully processed page advertised no later page
    IndexEnd,
    /// The configured page ceiling was reached
    PageCeiling,
}

/// Result of one walk
#[derive(Debug, Clone, PartialEq)]
pub enum CursorOutcome {
    Found { listing: ListingRef, page: u32 },
    Exhausted {
        reason: ExhaustionReason,
        pages_walked: u32,
    },
}

pub struct CrawlCursor<'a> {
    site: &'a SiteConfig,
    fetcher: &'a dyn PageFetcher,
    extractor: &'a dyn ListingExtractor,
}

impl<'a> CrawlCursor<'a> {
    pub fn new(
        site: &'a SiteConfig,
        fetcher: &'a dyn PageFetcher,
        extractor: &'a dyn ListingExtractor,
    ) -> Self {
        Self {
            site,
            fetcher,
            extractor,
        }
    }

    /// Finds the next unprocessed listing
    ///
    /// # Walk Rules
    ///
    /// | Page result | Action |
    /// |-------------|--------|
    /// | Fetch failed | Log, next page |
    /// | No listings | Log, next page |
    /// | Unprocessed listing found | Return it |
    /// | All processed, pager shows no later page | `Exhausted(IndexEnd)` |
    /// | All processed otherwise | Next page |
    ///
    /// Listings without an identifier are skipped. After `max_pages` pages the
    /// walk ends with `Exhausted(PageCeiling)`.
    ///
    /// # Arguments
    ///
    /// * `processed` - Canonical identifiers already processed
    ///
    /// # Returns
    ///
    /// * `Ok(CursorOutcome)` - The listing or the reason none was found
    /// * `Err(ConfigError)` - The stock list URL could not be built
    pub async fn next_unprocessed(
        &self,
        processed: &HashSet<String>,
    ) -> Result<CursorOutcome, ConfigError> {
        let max_pages = self.site.max_pages.max(1);
        tracing::info!(
            "Looking for next unprocessed vehicle ({} already processed)",
            processed.len()
        );

        for page in 1..=max_pages {
            let url = self.site.stock_page_url(page)?;
            tracing::info!(page, "Checking stock list page");

            let Some(html) = self.fetcher.fetch_text(&url).await else {
                tracing::warn!(page, "Stock list page unavailable, moving on");
                continue;
            };

            let listings = self.extractor.extract(&html, &url);
            if listings.is_empty() {
                tracing::warn!(page, "No vehicles found on page, moving on");
                continue;
            }

            for listing in &listings {
                if listing.identifier.is_empty() {
                    tracing::debug!("Skipping listing without reference: {}", listing.detail_link);
                    continue;
                }
                if processed.contains(&canonical_identifier(&listing.identifier)) {
                    tracing::debug!("Already processed: {}", listing.identifier);
                    continue;
                }

                tracing::info!(page, identifier = %listing.identifier, "Found unprocessed vehicle");
                return Ok(CursorOutcome::Found {
                    listing: listing.clone(),
                    page,
                });
            }

            tracing::info!(page, "All {} vehicles on page already processed", listings.len());

            if let Some(last) = self.extractor.total_pages(&html) {
                if last <= page {
                    tracing::info!(page, "Reached the last stock list page");
                    return Ok(CursorOutcome::Exhausted {
                        reason: ExhaustionReason::IndexEnd,
                        pages_walked: page,
                    });
                }
            }
        }

        tracing::warn!("Reached page limit ({}), stopping", max_pages);
        Ok(CursorOutcome::Exhausted {
            reason: ExhaustionReason::PageCeiling,
            pages_walked: max_pages,
        })
    }
}
