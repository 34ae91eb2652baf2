use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum_auth::AuthBearer;
use log::info;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::ranker::search_similar;

/// 搜索与指定截图相似的区块
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 401, description = "token 无效"),
        (status = 404, description = "截图尚未分析"),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if !state.authorize(&token) {
        return Err(AppError::Unauthorized);
    }

    let start = Instant::now();
    let image_url = state.images.relativize(&data.image_url);
    let options = data.options(&state.options);
    let limit = data.limit.unwrap_or(state.limit);

    info!("正在搜索: {image_url}");

    let images = &state.images;
    let result =
        search_similar(&state.store, &image_url, &options, limit, |url| images.resolve(url))
            .await?;

    Ok(Json(SearchResponse {
        time: start.elapsed().as_millis() as u64,
        result: result.into_iter().map(SearchHit::from).collect(),
    }))
}

/// 获取每种区块的处理进度
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, body = Vec<StatsRow>),
    )
)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StatsRow>>> {
    let stats = state.store.stats().await?;
    Ok(Json(stats.iter().map(StatsRow::from).collect()))
}
