use std::io::SeekFrom;
use std::path::Path;

use poem::http::{header, Method, StatusCode};
use poem::web::{Data, Path as UrlPath};
use poem::{handler, Body, Request, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::errors::ApiError;
use crate::range::{parse_range, RangeRequest};
use crate::state::AppState;

#[handler]
pub(super) async fn stream(
    req: &Request,
    UrlPath(filename): UrlPath<String>,
    state: Data<&AppState>,
) -> Result<Response, ApiError> {
    let path = state.storage.resolve(&filename).await?;
    let mut file = tokio::fs::File::open(&path).await?;
    let size = file.metadata().await?.len();

    let range_header = req
        .headers()
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let range = parse_range(range_header, size);

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .content_type(content_type(&path))
        .header(header::CONTENT_LENGTH, range.content_length(size));

    builder = match range {
        RangeRequest::Unsatisfiable => return Err(ApiError::RangeNotSatisfiable { size }),
        RangeRequest::Full => builder.status(StatusCode::OK),
        RangeRequest::Partial { start, end } => {
            file.seek(SeekFrom::Start(start)).await?;
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
        }
    };

    if req.method() == Method::HEAD {
        return Ok(builder.body(Body::empty()));
    }

    let body = Body::from_async_read(file.take(range.content_length(size)));
    Ok(builder.body(body))
}

// Everything in storage is audio, even when the container says video.
fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("video", subtype) => format!("audio/{subtype}"),
        _ => mime.essence_str().to_string(),
    }
}
