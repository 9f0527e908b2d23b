//! HTTP API
//!
//! Exposes run triggering and the processed vehicles. Runs triggered over
//! HTTP are serialized through an async mutex and, underneath, the same run
//! lock the CLI takes.

mod routes;

use crate::crawler::Coordinator;
use crate::output::Catalog;
use crate::state::PostedLedger;
use crate::DailyError;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Extension, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub catalog: Arc<Catalog>,
    pub posted: Arc<PostedLedger>,
    pub run_gate: Arc<Mutex<()>>,
    pub run_timeout: Duration,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        let config = coordinator.config();
        let catalog = Catalog::new(
            config.output.vehicles_dir.clone(),
            coordinator.store().clone(),
        );
        let posted = PostedLedger::new(config.output.posted_path.clone());
        let run_timeout = Duration::from_secs(config.server.run_timeout_secs);

        Self {
            coordinator: Arc::new(coordinator),
            catalog: Arc::new(catalog),
            posted: Arc::new(posted),
            run_gate: Arc::new(Mutex::new(())),
            run_timeout,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index_handler))
        .route("/health", get(routes::health_handler))
        .route("/scrape", post(routes::scrape_handler))
        .route("/scrape/force", post(routes::force_scrape_handler))
        .route("/vehicle/latest", get(routes::latest_vehicle_handler))
        .route("/vehicle/all", get(routes::all_vehicles_handler))
        .route("/vehicle/:ref_no", get(routes::vehicle_handler))
        .route("/images/:ref_no", get(routes::images_handler))
        .route("/image/:ref_no/:filename", get(routes::image_handler))
        .route("/webhook/new-vehicle", post(routes::new_vehicle_webhook_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until the process is stopped
///
/// # Arguments
///
/// * `state` - Shared handler state
/// * `bind` - Socket address, e.g. `0.0.0.0:5000`
pub async fn serve(state: AppState, bind: &str) -> Result<(), DailyError> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::PageFetcher;
    use crate::output::{VehicleData, DATA_FILE, IMAGES_DIR};
    use crate::state::StateStore;
    use crate::storage::SqliteRunHistory;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use url::Url;

    /// Serves one stock list page and its detail pages
    struct OneVehicleSite;

    #[async_trait]
    impl PageFetcher for OneVehicleSite {
        async fn fetch_bytes(&self, url: &Url) -> Option<Vec<u8>> {
            let html = match url.path() {
                "/stocklist/stock_country=44/sortkey=n" => {
                    r#"<a href="/nissan/note/nn42/id/7/">2017 NISSAN NOTE E-POWER</a>"#
                }
                "/nissan/note/nn42/id/7/" => {
                    r#"<title>2017 NISSAN NOTE E-POWER - BE FORWARD</title>
                    <table class="specification"><tr><th>Ref. No.</th><td>NN42</td></tr></table>"#
                }
                _ => return None,
            };
            Some(html.as_bytes().to_vec())
        }
    }

    /// Never answers
    struct StalledSite;

    #[async_trait]
    impl PageFetcher for StalledSite {
        async fn fetch_bytes(&self, _url: &Url) -> Option<Vec<u8>> {
            std::future::pending().await
        }
    }

    fn coordinator_in(dir: &TempDir, fetcher: Arc<dyn PageFetcher>) -> Coordinator {
        let mut config = Config::default();
        config.site.base_url = "https://stock.test".to_string();
        config.site.max_pages = 1;
        config.output.vehicles_dir = dir.path().join("vehicles");
        config.output.state_path = dir.path().join("state.json");
        config.output.posted_path = dir.path().join("posted_vehicles.json");

        let store = StateStore::new(config.output.state_path.clone())
            .with_today(|| NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        Coordinator::from_parts(config, "test", fetcher).with_store(store)
    }

    fn app_in(dir: &TempDir) -> Router {
        build_app(AppState::new(coordinator_in(dir, Arc::new(OneVehicleSite))))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seed_vehicle(dir: &TempDir, folder: &str, ref_no: &str) {
        let vehicle_dir = dir.path().join("vehicles").join(folder);
        std::fs::create_dir_all(vehicle_dir.join(IMAGES_DIR)).unwrap();
        let data = VehicleData {
            spec_schema_version: 1,
            title: "2017 NISSAN NOTE".to_string(),
            ref_no: ref_no.to_string(),
            detail_url: "https://stock.test/nissan/note/nn42/id/7/".to_string(),
            folder_name: folder.to_string(),
            scraped_at: Utc::now(),
            specs: Default::default(),
            price: None,
            image_count: 1,
            image_folder: String::new(),
        };
        std::fs::write(vehicle_dir.join(DATA_FILE), serde_json::to_vec(&data).unwrap()).unwrap();
        std::fs::write(vehicle_dir.join(IMAGES_DIR).join("a_001.jpg"), b"jpeg").unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get_json(app_in(&dir), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_latest_without_vehicles_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get_json(app_in(&dir), "/vehicle/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No vehicles found");
    }

    #[tokio::test]
    async fn test_vehicle_lookup_and_images() {
        let dir = TempDir::new().unwrap();
        seed_vehicle(&dir, "2017_NISSAN_NOTE_NN42", "NN42");

        let (status, body) = get_json(app_in(&dir), "/vehicle/nn42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ref_no"], "NN42");

        let (status, body) = get_json(app_in(&dir), "/images/NN42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"][0], "a_001.jpg");

        let (status, body) = get_json(app_in(&dir), "/vehicle/ZZ1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Vehicle ZZ1 not found");
    }

    #[tokio::test]
    async fn test_image_download() {
        let dir = TempDir::new().unwrap();
        seed_vehicle(&dir, "2017_NISSAN_NOTE_NN42", "NN42");

        let response = app_in(&dir)
            .oneshot(
                Request::builder()
                    .uri("/image/NN42/a_001.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");

        let (status, _) = get_json(app_in(&dir), "/image/NN42/..%2Fdata.json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scrape_then_latest() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir);

        let (status, body) = post_json(app.clone(), "/scrape", r#"{"skip_images": true}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["report"]["outcome"], "processed");
        assert_eq!(body["vehicle"]["data"]["ref_no"], "NN42");

        let (status, body) = get_json(app, "/vehicle/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["folder"], "2017_NISSAN_NOTE_NN42");
    }

    #[tokio::test]
    async fn test_failed_run_is_500() {
        let dir = TempDir::new().unwrap();
        let (status, body) = post_json(
            app_in(&dir),
            "/scrape",
            r#"{"skip_images": true, "url": "https://stock.test/nissan/leaf/zz9/id/8/"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["report"]["outcome"], "failed");
        assert!(body.get("vehicle").is_none());
    }

    #[tokio::test]
    async fn test_run_past_timeout_is_504() {
        let dir = TempDir::new().unwrap();
        let mut state = AppState::new(coordinator_in(&dir, Arc::new(StalledSite)));
        state.run_timeout = Duration::from_millis(50);

        let (status, body) = post_json(build_app(state), "/scrape/force", "{}").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["success"], false);

        // Nothing was committed
        let reloaded = StateStore::new(dir.path().join("state.json")).load();
        assert!(reloaded.processed_identifiers.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_last_run() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator_in(&dir, Arc::new(OneVehicleSite))
            .with_history(Box::new(SqliteRunHistory::new_in_memory().unwrap()));
        let app = build_app(AppState::new(coordinator));

        let (_, body) = get_json(app.clone(), "/health").await;
        assert!(body["last_run"].is_null());

        post_json(app.clone(), "/scrape", r#"{"skip_images": true}"#).await;

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["last_run"]["status"], "processed");
        assert_eq!(body["last_run"]["identifier"], "NN42");
    }

    #[tokio::test]
    async fn test_webhook_without_vehicles_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, body) = post_json(app_in(&dir), "/webhook/new-vehicle", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No vehicles found");
    }

    #[tokio::test]
    async fn test_webhook_hands_out_each_vehicle_once() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir);
        post_json(app.clone(), "/scrape", r#"{"skip_images": true}"#).await;

        let (status, body) = post_json(app.clone(), "/webhook/new-vehicle", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["post_required"], true);
        assert_eq!(body["vehicle"]["data"]["ref_no"], "NN42");

        let (status, body) = post_json(app, "/webhook/new-vehicle", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No new vehicles to post");
        assert_eq!(body["latest_ref"], "NN42");

        let ledger = PostedLedger::new(dir.path().join("posted_vehicles.json"));
        assert!(ledger.is_posted("nn42"));
    }
}
