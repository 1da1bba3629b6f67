//! Boundary HTTP routes (spec §6 + §C supplemented `GET /videos`), grounded
//! on `admin-gateway::routes::router`'s `Router::new().route(...).with_state`
//! shape.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use common::validation::{validate_id, validate_path_components, validate_uri};
use tracing::info;

use crate::api::dto::{
    CreateStreamDto, StartStreamResponse, StreamDto, UpdateStreamDto, VideoDaysDto,
};
use crate::api::state::AppState;
use crate::error::GatewayError;
use crate::lifecycle::Origin;
use crate::{manager::CreateStreamRequest, metrics};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .route("/streams", get(list_streams).post(create_stream))
        .route(
            "/streams/:id",
            get(get_stream).patch(update_stream).delete(delete_stream),
        )
        .route("/streams/:id/start", get(start_stream))
        .route("/streams/:id/stop", get(stop_stream))
        .route("/videos", get(list_videos))
        .route("/videos/:id/today/m3u8", get(today_playlist))
        .route("/videos/:id/date/:day/m3u8", get(historical_playlist))
        .route("/videos/:id/today/:name", get(today_segment))
        .route("/videos/:id/date/:day/:name", get(historical_segment))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn render_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamDto>> {
    let streams = state.manager().list_streams().await;
    Json(streams.iter().map(StreamDto::from).collect())
}

async fn create_stream(
    State(state): State<AppState>,
    Json(body): Json<CreateStreamDto>,
) -> Result<Json<StreamDto>, GatewayError> {
    validate_uri(&body.uri, "uri").map_err(|e| GatewayError::invalid_uri(e.to_string()))?;
    let req: CreateStreamRequest = body.into();
    let stream = state.manager().create_stream(req).await?;
    info!(stream_id = stream.id, "stream created");
    Ok(Json(StreamDto::from(&stream)))
}

async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StreamDto>, GatewayError> {
    let stream = state.manager().get_stream(id).await?;
    Ok(Json(StreamDto::from(&stream)))
}

async fn update_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStreamDto>,
) -> Result<Json<StreamDto>, GatewayError> {
    let stream = state.manager().update_stream(id, body.into()).await?;
    Ok(Json(StreamDto::from(&stream)))
}

async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, GatewayError> {
    state.manager().delete_stream(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StartStreamResponse>, GatewayError> {
    let wait_cycles = state.manager().start_stream(id, Origin::Operator).await?;
    Ok(Json(StartStreamResponse { wait_cycles }))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, GatewayError> {
    state.manager().stop_stream(id, Origin::Operator).await?;
    Ok(StatusCode::OK)
}

async fn list_videos(State(state): State<AppState>) -> Result<Json<Vec<VideoDaysDto>>, GatewayError> {
    let days = state.manager().list_all_video_days().await?;
    Ok(Json(
        days.into_iter()
            .map(|(stream_id, days)| VideoDaysDto { stream_id, days })
            .collect(),
    ))
}

async fn today_playlist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, GatewayError> {
    let playlist = state.manager().render_today_playlist(id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        playlist,
    ))
}

async fn historical_playlist(
    State(state): State<AppState>,
    Path((id, day)): Path<(i64, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    validate_id(&day, "day").map_err(|e| GatewayError::invalid_uri(e.to_string()))?;
    let stream = state.manager().get_stream(id).await?;
    let key = format!("{}/{}/{}", id, day, stream.protocol_info.playlist_name);
    let bytes = state.object_store().get_object(&key).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        bytes.to_vec(),
    ))
}

async fn today_segment(
    State(state): State<AppState>,
    Path((id, name)): Path<(i64, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    validate_path_components(FsPath::new(&name), None, "segment name")
        .map_err(|e| GatewayError::invalid_uri(e.to_string()))?;
    let bytes = state.manager().read_live_segment(id, &name).await?;
    Ok(([(header::CONTENT_TYPE, "video/mp2t")], bytes))
}

async fn historical_segment(
    State(state): State<AppState>,
    Path((id, day, name)): Path<(i64, String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    validate_id(&day, "day").map_err(|e| GatewayError::invalid_uri(e.to_string()))?;
    validate_path_components(FsPath::new(&name), None, "segment name")
        .map_err(|e| GatewayError::invalid_uri(e.to_string()))?;
    let key = format!("{}/{}/{}", id, day, name);
    let bytes = state.object_store().get_object(&key).await?;
    Ok(([(header::CONTENT_TYPE, "video/mp2t")], bytes.to_vec()))
}
