//! HTTP handlers

use crate::crawler::{RunOutcome, RunReport, RunRequest};
use crate::output::CatalogEntry;
use crate::server::AppState;
use crate::state::canonical_identifier;
use axum::extract::{Extension, Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Serialize)]
pub struct ScrapeResponse {
    success: bool,
    message: String,
    report: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle: Option<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<usize>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Endpoint index
pub async fn index_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "BE FORWARD daily vehicle scraper",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /health": "Health check",
            "POST /scrape": "Process the next vehicle (body: force, country, skip_images, mode, no_crop, url)",
            "POST /scrape/force": "Process the next vehicle even if a run already happened today",
            "GET /vehicle/latest": "Most recently processed vehicle",
            "GET /vehicle/all?limit=N": "Recently processed vehicles, newest first",
            "GET /vehicle/{ref}": "One vehicle by reference number",
            "GET /images/{ref}": "Photo list of a vehicle",
            "GET /image/{ref}/{filename}": "One photo",
            "POST /webhook/new-vehicle": "Latest vehicle if it has not been handed out for posting yet",
        }
    }))
}

pub async fn health_handler(Extension(state): Extension<AppState>) -> Json<serde_json::Value> {
    let config = state.coordinator.config();
    let coordinator = state.coordinator.clone();
    let last_run = tokio::task::spawn_blocking(move || coordinator.latest_run())
        .await
        .unwrap_or_default();

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "output_dir": config.output.vehicles_dir.display().to_string(),
        "state_file": config.output.state_path.display().to_string(),
        "last_run": last_run,
    }))
}

/// Runs the coordinator, one request at a time
pub async fn scrape_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    run_and_respond(state, request).await
}

pub async fn force_scrape_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let mut request = body.map(|Json(request)| request).unwrap_or_default();
    request.force = true;
    run_and_respond(state, request).await
}

async fn run_and_respond(state: AppState, request: RunRequest) -> Response {
    let _gate = state.run_gate.lock().await;
    tracing::info!(force = request.force, "Scrape requested over HTTP");

    let report = match tokio::time::timeout(state.run_timeout, state.coordinator.run(&request)).await
    {
        Ok(report) => report,
        Err(_) => {
            tracing::error!("Scrape did not finish within {:?}", state.run_timeout);
            return (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "success": false,
                    "message": format!(
                        "Scrape timed out after {} seconds",
                        state.run_timeout.as_secs()
                    ),
                })),
            )
                .into_response();
        }
    };

    let vehicle = match (report.outcome, report.identifier.as_deref()) {
        (RunOutcome::Processed, Some(identifier)) => state.catalog.by_ref(identifier),
        _ => None,
    };
    let status = if report.outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let message = report
        .message
        .clone()
        .unwrap_or_else(|| format!("{:?}", report.outcome));

    (
        status,
        Json(ScrapeResponse {
            success: report.outcome.is_success(),
            message,
            report,
            vehicle,
        }),
    )
        .into_response()
}

pub async fn latest_vehicle_handler(Extension(state): Extension<AppState>) -> Response {
    match state.catalog.latest() {
        Some(entry) => Json(entry).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No vehicles found"),
    }
}

pub async fn all_vehicles_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListParams>,
) -> Json<serde_json::Value> {
    let vehicles = state
        .catalog
        .recent(params.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    Json(json!({
        "count": vehicles.len(),
        "vehicles": vehicles,
    }))
}

pub async fn vehicle_handler(
    Extension(state): Extension<AppState>,
    Path(ref_no): Path<String>,
) -> Response {
    match state.catalog.by_ref(&ref_no) {
        Some(entry) => Json(entry).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Vehicle {ref_no} not found")),
    }
}

pub async fn images_handler(
    Extension(state): Extension<AppState>,
    Path(ref_no): Path<String>,
) -> Response {
    match state.catalog.images(&ref_no) {
        Some(listing) => Json(listing).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Vehicle {ref_no} not found")),
    }
}

pub async fn image_handler(
    Extension(state): Extension<AppState>,
    Path((ref_no, filename)): Path<(String, String)>,
) -> Response {
    let Some(path) = state.catalog.image_path(&ref_no, &filename) else {
        return error_response(StatusCode::NOT_FOUND, format!("Image {filename} not found"));
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], bytes).into_response()
        }
        Err(e) => {
            tracing::warn!("Could not read {}: {}", path.display(), e);
            error_response(StatusCode::NOT_FOUND, format!("Image {filename} not found"))
        }
    }
}

/// Polled by the posting workflow
///
/// Hands out the latest vehicle once: the first call marks it posted, later
/// calls report that nothing new is waiting until another vehicle is
/// processed.
pub async fn new_vehicle_webhook_handler(Extension(state): Extension<AppState>) -> Response {
    let Some(entry) = state.catalog.latest() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No vehicles found" })),
        )
            .into_response();
    };

    let ref_no = canonical_identifier(&entry.data.ref_no);
    let posted = state.posted.clone();
    let claimed = {
        let ref_no = ref_no.clone();
        tokio::task::spawn_blocking(move || posted.claim(&ref_no)).await
    };
    let claimed = match claimed {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Posted ledger task failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Posted ledger unavailable");
        }
    };

    match claimed {
        Ok(true) => {
            tracing::info!("Handing {} out for posting", ref_no);
            Json(json!({
                "vehicle": entry,
                "post_required": true,
            }))
            .into_response()
        }
        Ok(false) => Json(json!({
            "message": "No new vehicles to post",
            "latest_ref": ref_no,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Could not update {}: {}", state.posted.path().display(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
