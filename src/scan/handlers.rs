use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{FrameAck, ScanReport, ScanStatus};
use super::scanner::ScanOutcome;
use crate::{qr, state::AppState};

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan/start", post(start_scan))
        .route("/scan/stop", post(stop_scan))
        .route("/scan/status", get(scan_status))
        .route("/scan/frame", post(push_frame))
        .route("/scan/image", post(scan_image))
}

async fn resolve(state: &AppState, id: String) -> ScanReport {
    let profile = state.store.get_by_id(&id).await;
    if profile.is_none() {
        info!(id = %id, "scanned id is not in the directory");
    }
    ScanReport {
        session: None,
        id: Some(id),
        profile,
        error: None,
    }
}

async fn status(state: &AppState) -> ScanStatus {
    ScanStatus {
        is_scanning: state.scanner.is_scanning(),
        state: state.scanner.state(),
        last_result: state.last_scan.lock().await.report.clone(),
    }
}

/// Store a live scan's report unless a newer session has claimed the slot.
async fn record_report(state: &AppState, session: Uuid, report: ScanReport) -> bool {
    let mut last = state.last_scan.lock().await;
    if last.session != Some(session) {
        debug!(%session, "dropping report of a superseded scan");
        return false;
    }
    last.report = Some(ScanReport {
        session: Some(session),
        ..report
    });
    true
}

async fn off_runtime<T, F>(work: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "image task failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "image processing failed".into())
    })
}

async fn read_image(body: Bytes) -> Result<image::DynamicImage, (StatusCode, String)> {
    let len = body.len();
    off_runtime(move || image::load_from_memory(&body))
        .await?
        .map_err(|e| {
            warn!(error = %e, len, "unreadable image upload");
            (StatusCode::BAD_REQUEST, format!("unreadable image: {}", e))
        })
}

#[instrument(skip(state))]
pub async fn start_scan(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ScanStatus>), (StatusCode, String)> {
    let handle = match state.scanner.start().await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "scan start rejected");
            return Err((StatusCode::CONFLICT, e.to_string()));
        }
    };
    let session = handle.session;
    {
        let mut last = state.last_scan.lock().await;
        last.session = Some(session);
        last.report = None;
    }

    let st = state.clone();
    tokio::spawn(async move {
        let report = match handle.outcome.await {
            Ok(ScanOutcome::Decoded(id)) => resolve(&st, id).await,
            Ok(ScanOutcome::Failed(e)) => ScanReport {
                session: None,
                id: None,
                profile: None,
                error: Some(e),
            },
            Err(_) => {
                debug!(%session, "scan session stopped without a result");
                return;
            }
        };
        record_report(&st, session, report).await;
    });

    Ok((StatusCode::ACCEPTED, Json(status(&state).await)))
}

#[instrument(skip(state))]
pub async fn stop_scan(State(state): State<AppState>) -> Json<ScanStatus> {
    state.scanner.stop().await;
    Json(status(&state).await)
}

pub async fn scan_status(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(status(&state).await)
}

pub async fn push_frame(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<FrameAck>), (StatusCode, String)> {
    let frame = read_image(body).await?.to_luma8();
    let accepted = state
        .camera
        .push_frame(frame)
        .await
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(FrameAck { accepted })))
}

/// Decode one captured still image and resolve it against the directory.
#[instrument(skip(state, body))]
pub async fn scan_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ScanReport>, (StatusCode, String)> {
    let image = read_image(body).await?;
    let Some(id) = off_runtime(move || qr::decode_image(&image)).await? else {
        debug!("no qr code in uploaded image");
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "No QR code found in image".into(),
        ));
    };
    Ok(Json(resolve(&state, id).await))
}
