//! Photo retrieval over HTTP

use crate::{
    detail_page, detail_path, jpeg_bytes, mount_bytes, mount_html, stock_page, stock_page_path,
    test_config, test_coordinator, InstantClock,
};
use beforward_daily::config::{FetcherConfig, ImageConfig, ImageMode};
use beforward_daily::crawler::{HttpFetcher, RunOutcome, RunRequest};
use beforward_daily::vehicle::{BeForwardDetailExtractor, DetailExtractor, ImagePipeline};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;
use zip::write::SimpleFileOptions;

fn photo_archive() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    writer.add_directory("AB1/", options).unwrap();
    writer.start_file("AB1/photo_1.jpg", options).unwrap();
    writer.write_all(&jpeg_bytes(40, 100)).unwrap();
    writer.start_file("AB1/photo_2.jpg", options).unwrap();
    writer.write_all(&jpeg_bytes(40, 100)).unwrap();
    writer.start_file("__MACOSX/AB1/._photo_1.jpg", options).unwrap();
    writer.write_all(b"resource fork").unwrap();

    writer.finish().unwrap().into_inner()
}

fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_zip_mode_extracts_the_archive() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, &stock_page_path(1), stock_page(&["AB1"], 1)).await;
    mount_html(&server, &detail_path("AB1"), detail_page("AB1", 2, true)).await;
    mount_bytes(&server, "/archive/ab1.zip", photo_archive()).await;

    let coordinator = test_coordinator(test_config(&server, &dir));
    let report = coordinator
        .run(&RunRequest {
            image_mode: Some(ImageMode::Zip),
            no_crop: true,
            ..RunRequest::default()
        })
        .await;

    assert_eq!(report.outcome, RunOutcome::Processed, "{:?}", report.message);
    let images_dir = report.artifacts.unwrap().folder.join("images");
    let mut stored: Vec<String> = std::fs::read_dir(&images_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    stored.sort();
    assert_eq!(stored, vec!["photo_1.jpg", "photo_2.jpg"]);

    // Uncropped
    let photo = image::open(images_dir.join("photo_1.jpg")).unwrap();
    assert_eq!(photo.height(), 100);
}

#[tokio::test]
async fn test_broken_archive_falls_back_to_individual_photos() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let detail_url = Url::parse(&format!("{}{}", server.uri(), detail_path("AB1"))).unwrap();
    let html = detail_page("AB1", 2, true);
    mount_bytes(&server, "/archive/ab1.zip", b"definitely not a zip".to_vec()).await;
    mount_bytes(&server, "/photos/large/ab1_1.jpg", jpeg_bytes(40, 200)).await;
    // The second photo is missing and gets skipped

    let detail = BeForwardDetailExtractor.extract(&html, &detail_url).unwrap();
    assert!(detail.archive_url.is_some());
    assert_eq!(detail.photo_urls.len(), 2);

    let config = FetcherConfig {
        max_retries: 1,
        ..FetcherConfig::default()
    };
    let fetcher = HttpFetcher::new(&config)
        .unwrap()
        .with_clock(Arc::new(InstantClock::default()));
    let pipeline = ImagePipeline::new(Arc::new(fetcher), ImageConfig::default());

    let vehicle_dir = dir.path().join("2019_TOYOTA_LAND_AB1");
    let stored = pipeline
        .retrieve(&detail, &vehicle_dir, ImageMode::Zip, true)
        .await
        .unwrap();

    assert_eq!(file_names(&stored), vec!["2019_TOYOTA_LAND_AB1_001.jpg"]);
    let photo = image::open(&stored[0]).unwrap();
    assert_eq!(photo.height(), 186);
}
