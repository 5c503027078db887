mod play;
mod search;
mod stream;

use poem::middleware::{Cors, Tracing};
use poem::web::{Data, Json};
use poem::{get, handler, Endpoint, EndpointExt, IntoResponse, Route};
use serde_json::json;

use crate::state::AppState;

#[handler]
async fn health(state: Data<&AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "extractor": state.extractor.name(),
        "cache": state.cache.backend_name(),
    }))
}

pub fn app(state: AppState) -> impl Endpoint {
    Route::new()
        .at("/", get(health))
        .at("/search", get(search::search))
        .at("/play", get(play::play).post(play::play))
        .at("/stream/:filename", get(stream::stream).head(stream::stream))
        .data(state)
        .with(Cors::new())
        .with(Tracing)
}
