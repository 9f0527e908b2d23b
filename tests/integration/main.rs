//! Integration tests for beforward-daily
//!
//! These tests use wiremock to stand in for the stock site and run the
//! coordinator end-to-end over real HTTP.

mod daily_run_tests;
mod image_tests;

use async_trait::async_trait;
use beforward_daily::config::Config;
use beforward_daily::crawler::{Clock, Coordinator, HttpFetcher};
use beforward_daily::state::StateStore;
use chrono::NaiveDate;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Clock that records requested sleeps and returns immediately
#[derive(Default)]
pub struct InstantClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub const FIRST_PAGE: &str = "/stocklist/stock_country=44/sortkey=n";

pub fn stock_page_path(page: u32) -> String {
    if page <= 1 {
        FIRST_PAGE.to_string()
    } else {
        format!("/stocklist/page={page}/stock_country=44/sortkey=n")
    }
}

pub fn detail_path(ref_no: &str) -> String {
    format!("/toyota/land-cruiser/{}/id/{}/", ref_no.to_lowercase(), ref_no.len())
}

/// A stock list page listing `refs`, with a pager pointing at `last_page`
pub fn stock_page(refs: &[&str], last_page: u32) -> String {
    let mut html = String::from("<html><body><ul class=\"stocklist\">");
    for r in refs {
        html.push_str(&format!(
            r#"<li><a href="{0}"><img src="/thumb.jpg"></a><a href="{0}">2019 TOYOTA LAND CRUISER ZX</a></li>"#,
            detail_path(r)
        ));
    }
    html.push_str("</ul><div class=\"results-pagination\">");
    for page in 1..=last_page {
        html.push_str(&format!(
            r#"<a href="/stocklist/page={page}/stock_country=44/sortkey=n">{page}</a>"#
        ));
    }
    html.push_str("</div></body></html>");
    html
}

/// A detail page for `ref_no` with `photos` gallery entries
pub fn detail_page(ref_no: &str, photos: usize, archive: bool) -> String {
    let mut gallery = String::new();
    for i in 1..=photos {
        gallery.push_str(&format!(
            r#"<a href="/photos/small/{}_{i}.jpg"><img src="/photos/small/{}_{i}.jpg"></a>"#,
            ref_no.to_lowercase(),
            ref_no.to_lowercase()
        ));
    }
    let archive_link = if archive {
        format!(
            r#"<a href="/archive/{}.zip">Download all images</a>"#,
            ref_no.to_lowercase()
        )
    } else {
        String::new()
    };

    format!(
        r#"<html><head><title>2019 TOYOTA LAND CRUISER ZX - BE FORWARD</title></head><body>
        <span class="fn-price-total">US$ 45,000</span>
        <table class="specification">
          <tr><th>Ref. No.</th><td>{ref_no}</td><th>Mileage</th><td>12,000 km</td></tr>
          <tr><th>Location</th><td>Dubai</td><th>Fuel</th><td>Diesel</td></tr>
          <tr><th>Transmission</th><td>AT</td><th>Drive</th><td>4wheel drive</td></tr>
        </table>
        <div id="gallery">{gallery}</div>
        {archive_link}
        </body></html>"#
    )
}

/// JPEG bytes of a `width` x `height` image
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([120u8, 80, 40]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

pub async fn mount_html(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

pub async fn mount_bytes(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

/// Configuration pointing at `server` with every output inside `dir`
pub fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.site.base_url = server.uri();
    config.site.max_pages = 3;
    config.fetcher.max_retries = 2;
    config.output.vehicles_dir = dir.path().join("vehicles");
    config.output.state_path = dir.path().join("state").join("scraper_state.json");
    config.output.history_path = dir.path().join("state").join("history.db");
    config
}

/// Coordinator over real HTTP with instant sleeps and a fixed calendar day
pub fn test_coordinator(config: Config) -> Coordinator {
    let fetcher = HttpFetcher::new(&config.fetcher)
        .unwrap()
        .with_clock(Arc::new(InstantClock::default()));
    let store = StateStore::new(config.output.state_path.clone())
        .with_today(|| NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    Coordinator::from_parts(config, "integration", Arc::new(fetcher)).with_store(store)
}
