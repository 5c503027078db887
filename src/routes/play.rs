use poem::web::{Data, Json, Query};
use poem::{handler, IntoResponse};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::state::AppState;
use crate::youtube::extract_video_id;

#[derive(Debug, Deserialize)]
struct PlayParams {
    url: Option<String>,
    id: Option<String>,
}

#[handler]
pub(super) async fn play(
    Query(params): Query<PlayParams>,
    state: Data<&AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let present = |v: &String| !v.trim().is_empty();
    let input = params
        .url
        .filter(present)
        .or(params.id.filter(present))
        .ok_or(ApiError::MissingParam("url"))?;
    let video_id = extract_video_id(&input).ok_or(ApiError::InvalidUrl)?;

    let played = state.play(&video_id).await?;
    Ok(Json(played))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use poem::http::StatusCode;
    use poem::test::TestClient;
    use serde_json::Value;

    use crate::routes;
    use crate::state::test_support::{state_with, StubExtractor, PAYLOAD};

    #[tokio::test]
    async fn extracts_and_links_stream() {
        let (state, dir) = state_with(Arc::new(StubExtractor::default()));
        let cli = TestClient::new(routes::app(state));

        let resp = cli
            .get("/play")
            .query("url", &"https://youtu.be/dQw4w9WgXcQ?t=10")
            .send()
            .await;
        resp.assert_status_is_ok();

        let body: Value = serde_json::from_str(&resp.0.into_body().into_string().await.unwrap()).unwrap();
        assert_eq!(body["id"], "dQw4w9WgXcQ");
        assert_eq!(body["title"], "Stub");
        assert_eq!(body["duration"], 212);
        assert_eq!(body["duration_text"], "3:32");
        assert_eq!(body["cached"], false);

        let filename = body["filename"].as_str().unwrap();
        assert_eq!(body["stream_url"], format!("/stream/{filename}"));
        assert_eq!(std::fs::read(dir.path().join(filename)).unwrap(), PAYLOAD);

        let resp = cli.get(format!("/stream/{filename}")).send().await;
        resp.assert_status_is_ok();
        resp.assert_bytes(PAYLOAD).await;
    }

    #[tokio::test]
    async fn accepts_bare_ids_and_post() {
        let (state, _dir) = state_with(Arc::new(StubExtractor::default()));
        let cli = TestClient::new(routes::app(state));

        cli.get("/play")
            .query("id", &"dQw4w9WgXcQ")
            .send()
            .await
            .assert_status_is_ok();

        let resp = cli.post("/play").query("id", &"dQw4w9WgXcQ").send().await;
        resp.assert_status_is_ok();
        let body: Value = serde_json::from_str(&resp.0.into_body().into_string().await.unwrap()).unwrap();
        assert_eq!(body["cached"], true);
    }

    #[tokio::test]
    async fn blank_url_falls_through_to_id() {
        let (state, _dir) = state_with(Arc::new(StubExtractor::default()));
        let cli = TestClient::new(routes::app(state));

        let resp = cli
            .get("/play")
            .query("url", &"")
            .query("id", &"dQw4w9WgXcQ")
            .send()
            .await;
        resp.assert_status_is_ok();
        let body: Value = serde_json::from_str(&resp.0.into_body().into_string().await.unwrap()).unwrap();
        assert_eq!(body["id"], "dQw4w9WgXcQ");

        cli.get("/play")
            .query("url", &"")
            .query("id", &"")
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_missing_and_invalid_urls() {
        let (state, _dir) = state_with(Arc::new(StubExtractor::default()));
        let cli = TestClient::new(routes::app(state));

        cli.get("/play").send().await.assert_status(StatusCode::BAD_REQUEST);

        let resp = cli
            .get("/play")
            .query("url", &"https://vimeo.com/12345")
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&resp.0.into_body().into_string().await.unwrap()).unwrap();
        assert_eq!(body["message"], "Invalid video URL or ID");
    }
}
