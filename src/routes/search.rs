use poem::web::{Data, Json, Query};
use poem::{handler, IntoResponse};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::state::AppState;
use crate::youtube::VideoInfo;

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<VideoInfo>,
}

#[handler]
pub(super) async fn search(
    Query(params): Query<SearchParams>,
    state: Data<&AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::MissingParam("q"))?
        .to_string();

    let config = &state.config;
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => config.search_limit,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::InvalidParam("limit"))?
            .clamp(1, config.max_search_limit),
    };

    let results = state.search(&query, limit).await?;
    Ok(Json(SearchResponse { query, results }))
}
