//! End-to-end daily runs against a mocked stock site

use crate::{
    detail_page, detail_path, jpeg_bytes, mount_bytes, mount_html, stock_page, stock_page_path,
    test_config, test_coordinator,
};
use beforward_daily::crawler::{ExhaustionReason, RunOutcome, RunPhase, RunRequest};
use beforward_daily::output::{VehicleData, DATA_FILE, POST_FILE};
use beforward_daily::vehicle::SocialPost;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forced_without_images() -> RunRequest {
    RunRequest {
        force: true,
        skip_images: true,
        ..RunRequest::default()
    }
}

#[tokio::test]
async fn test_daily_cycle_walks_the_whole_stock_list() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, &stock_page_path(1), stock_page(&["AB1", "AB2"], 2)).await;
    mount_html(&server, &stock_page_path(2), stock_page(&["CD3"], 2)).await;
    for r in ["AB1", "AB2", "CD3"] {
        mount_html(&server, &detail_path(r), detail_page(r, 2, false)).await;
    }
    mount_bytes(&server, "/photos/large/ab1_1.jpg", jpeg_bytes(40, 200)).await;
    mount_bytes(&server, "/photos/large/ab1_2.jpg", jpeg_bytes(40, 200)).await;

    let coordinator = test_coordinator(test_config(&server, &dir));

    // First run of the day processes the first vehicle with its photos
    let report = coordinator.run(&RunRequest::default()).await;
    assert_eq!(report.outcome, RunOutcome::Processed, "{:?}", report.message);
    assert_eq!(report.identifier.as_deref(), Some("AB1"));

    let folder = report.artifacts.as_ref().unwrap().folder.clone();
    assert!(folder.ends_with("2019_TOYOTA_LAND_AB1"));

    let first_photo = folder.join("images").join("2019_TOYOTA_LAND_AB1_001.jpg");
    let photo = image::open(&first_photo).unwrap();
    assert_eq!((photo.width(), photo.height()), (40, 186));

    let data: VehicleData =
        serde_json::from_str(&std::fs::read_to_string(folder.join(DATA_FILE)).unwrap()).unwrap();
    assert_eq!(data.image_count, 2);
    assert_eq!(data.specs.fuel.as_deref(), Some("Diesel"));
    assert_eq!(data.price.as_deref(), Some("US$ 45,000"));

    let post: SocialPost =
        serde_json::from_str(&std::fs::read_to_string(folder.join(POST_FILE)).unwrap()).unwrap();
    assert_eq!(post.images.len(), 2);
    assert!(post.post_content.hashtags.contains(&"#Automatic".to_string()));
    assert!(post.post_content.hashtags.contains(&"#4x4".to_string()));
    assert!(post.post_content.body.contains("📍 Location: Dubai, UAE"));

    // Same day again: gated
    let report = coordinator.run(&RunRequest::default()).await;
    assert_eq!(report.outcome, RunOutcome::Skipped);

    // Forced runs keep walking in stock list order
    let report = coordinator.run(&forced_without_images()).await;
    assert_eq!(report.identifier.as_deref(), Some("AB2"));

    let report = coordinator.run(&forced_without_images()).await;
    assert_eq!(report.identifier.as_deref(), Some("CD3"));
    assert_eq!(report.estimated_total, 50);

    let report = coordinator.run(&forced_without_images()).await;
    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert_eq!(report.exhaustion, Some(ExhaustionReason::IndexEnd));
    assert_eq!(report.exit_code(), 0);

    let state = coordinator.store().load();
    assert_eq!(state.processed_identifiers, vec!["AB1", "AB2", "CD3"]);
    assert_eq!(state.position_index, 3);
}

#[tokio::test]
async fn test_failed_detail_fetch_is_retried_on_the_next_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, &stock_page_path(1), stock_page(&["AB1", "AB2"], 1)).await;

    // Both attempts of the first run fail
    Mock::given(method("GET"))
        .and(path(detail_path("AB1")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_html(&server, &detail_path("AB1"), detail_page("AB1", 0, false)).await;

    let coordinator = test_coordinator(test_config(&server, &dir));
    let request = RunRequest {
        skip_images: true,
        ..RunRequest::default()
    };

    let report = coordinator.run(&request).await;
    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.failed_phase, Some(RunPhase::FetchDetail));
    assert_eq!(report.exit_code(), 1);
    assert!(coordinator.store().load().processed_identifiers.is_empty());

    // Not gated: the failed run did not count as today's run
    let report = coordinator.run(&request).await;
    assert_eq!(report.outcome, RunOutcome::Processed);
    assert_eq!(report.identifier.as_deref(), Some("AB1"));
    assert_eq!(coordinator.store().load().processed_identifiers, vec!["AB1"]);
}

#[tokio::test]
async fn test_legacy_state_file_is_honored() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, &stock_page_path(1), stock_page(&["AB1", "AB2"], 1)).await;
    mount_html(&server, &detail_path("AB2"), detail_page("AB2", 0, false)).await;

    let config = test_config(&server, &dir);
    std::fs::create_dir_all(config.output.state_path.parent().unwrap()).unwrap();
    std::fs::write(
        &config.output.state_path,
        r#"{"scraped_vehicles": ["ab1"], "last_scraped_ref": "ab1",
            "last_scraped_date": "2024-04-30", "current_index": 1, "total_available": 0}"#,
    )
    .unwrap();

    let coordinator = test_coordinator(config);
    let report = coordinator
        .run(&RunRequest {
            skip_images: true,
            ..RunRequest::default()
        })
        .await;

    assert_eq!(report.outcome, RunOutcome::Processed);
    assert_eq!(report.identifier.as_deref(), Some("AB2"));
    assert_eq!(
        coordinator.store().load().processed_identifiers,
        vec!["AB1", "AB2"]
    );
}

#[tokio::test]
async fn test_corrupt_state_file_starts_over_and_is_kept() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, &stock_page_path(1), stock_page(&["AB1"], 1)).await;
    mount_html(&server, &detail_path("AB1"), detail_page("AB1", 0, false)).await;

    let config = test_config(&server, &dir);
    let state_dir = config.output.state_path.parent().unwrap().to_path_buf();
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(&config.output.state_path, "{ not json").unwrap();

    let coordinator = test_coordinator(config);
    let report = coordinator
        .run(&RunRequest {
            skip_images: true,
            ..RunRequest::default()
        })
        .await;
    assert_eq!(report.identifier.as_deref(), Some("AB1"));

    let backups: Vec<String> = std::fs::read_dir(&state_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("scraper_state.json.corrupt-"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[tokio::test]
async fn test_page_ceiling_without_pagination() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // No pager on any page and everything already processed
    for page in 1..=5 {
        mount_html(
            &server,
            &stock_page_path(page),
            r#"<a href="/toyota/land-cruiser/ab1/id/3/">2019 TOYOTA LAND CRUISER</a>"#.to_string(),
        )
        .await;
    }

    let config = test_config(&server, &dir);
    std::fs::create_dir_all(config.output.state_path.parent().unwrap()).unwrap();
    std::fs::write(
        &config.output.state_path,
        r#"{"processed_identifiers": ["AB1"]}"#,
    )
    .unwrap();

    let coordinator = test_coordinator(config);
    let report = coordinator.run(&forced_without_images()).await;
    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert_eq!(report.exhaustion, Some(ExhaustionReason::PageCeiling));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}
