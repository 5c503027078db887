use poem::error::ResponseError;
use poem::http::{header, StatusCode};
use poem::Response;
use serde_json::json;

use crate::youtube::ExtractError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing query parameter: {0}")]
    MissingParam(&'static str),
    #[error("Invalid query parameter: {0}")]
    InvalidParam(&'static str),
    #[error("Invalid video URL or ID")]
    InvalidUrl,
    #[error("Invalid filename")]
    InvalidFilename,
    #[error("File not found")]
    NotFound,
    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },
    #[error("Search failed: {0}")]
    Search(ExtractError),
    #[error("Extraction failed: {0}")]
    Extraction(ExtractError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParam(_)
            | ApiError::InvalidParam(_)
            | ApiError::InvalidUrl
            | ApiError::InvalidFilename => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Search(_) | ApiError::Extraction(_) => StatusCode::BAD_GATEWAY,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn as_response(&self) -> Response {
        let status = self.status();
        let body = json!({
            "status": status.as_u16(),
            "message": self.to_string(),
        });

        let mut builder = Response::builder()
            .status(status)
            .content_type("application/json");
        if let ApiError::RangeNotSatisfiable { size } = self {
            builder = builder.header(header::CONTENT_RANGE, format!("bytes */{size}"));
        }
        builder.body(body.to_string())
    }
}
