use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

use crate::{
    profiles::{dto::RegisterRequest, repo_types::Profile, services::validate},
    qr::{self, EncodeError},
    state::AppState,
};

pub fn helper_routes() -> Router<AppState> {
    Router::new()
        .route("/helpers", post(register).get(list_helpers))
        .route("/helpers/:id", get(get_helper))
        .route("/helpers/:id/qr.png", get(helper_qr))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Profile>), (StatusCode, String)> {
    let input = match validate(payload) {
        Ok(i) => i,
        Err(e) => {
            warn!(error = %e, "registration rejected");
            return Err((StatusCode::BAD_REQUEST, e.to_string()));
        }
    };
    let profile = state.store.create(input).await;
    info!(id = %profile.id, "registration accepted");

    if let Some(dir) = &state.config.export_dir {
        match export_code(&state, &profile.id, dir).await {
            Ok(path) => info!(id = %profile.id, path = %path.display(), "qr code exported"),
            Err(e) => warn!(error = %e, id = %profile.id, "qr export failed"),
        }
    }
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn export_code(state: &AppState, id: &str, dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create export dir {}", dir.display()))?;
    let surface = qr::encode(id, &state.config.qr)?;
    let path = qr::export_png(&surface, dir)?;
    Ok(path)
}

#[instrument(skip(state))]
pub async fn list_helpers(State(state): State<AppState>) -> Json<Vec<Profile>> {
    Json(state.store.list().await)
}

#[instrument(skip(state))]
pub async fn get_helper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, (StatusCode, String)> {
    state
        .store
        .get_by_id(&id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Helper not found".into()))
}

#[instrument(skip(state))]
pub async fn helper_qr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Some(profile) = state.store.get_by_id(&id).await else {
        return Err((StatusCode::NOT_FOUND, "Helper not found".into()));
    };

    let png = qr::encode(&profile.id, &state.config.qr)
        .and_then(|surface| surface.to_png())
        .map_err(|e| {
            error!(error = %e, id = %profile.id, "qr render failed");
            let status = match e {
                EncodeError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        qr::suggested_filename(&profile.id)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        png,
    ))
}
