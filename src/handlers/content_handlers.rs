//! HTTP handlers for uploading learning materials and reading them back.
//! Binary media is streamed straight from disk with `Range` support; text
//! files come back as JSON.

use crate::{
    errors::AppError,
    services::content_service::{Delivery, StreamDelivery, StreamKind},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::io;
use tracing::info;

/// `GET /api/upload/{file_id}/content`
pub async fn get_content(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers.get(header::RANGE).map(HeaderValue::as_bytes);

    match state.content.deliver(&file_id, range).await? {
        Delivery::Text { content } => Ok(Json(json!({ "content": content })).into_response()),
        Delivery::Stream(delivery) => Ok(stream_response(delivery)),
    }
}

/// `POST /api/upload` — multipart form with a `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "upload".into());
        let mimetype = field.content_type().map(str::to_string);
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));

        let file = state.storage.store_stream(&filename, mimetype, stream).await?;
        info!("uploaded {} as {} ({} bytes)", file.filename, file.id, file.size);

        return Ok(Json(json!({ "success": true, "file": file })));
    }

    Err(AppError::bad_request("no file uploaded"))
}

fn stream_response(delivery: StreamDelivery) -> Response {
    let StreamDelivery {
        kind,
        content_type,
        content_length,
        total_size,
        body,
    } = delivery;

    let mut response = Response::new(Body::from_stream(body.into_stream()));
    *response.status_mut() = match kind {
        StreamKind::Full => StatusCode::OK,
        StreamKind::Single(_) | StreamKind::Multi(_) => StatusCode::PARTIAL_CONTENT,
    };

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let StreamKind::Single(range) = kind {
        if let Ok(value) = HeaderValue::from_str(&range.content_range(total_size)) {
            headers.insert(header::CONTENT_RANGE, value);
        }
    }

    response
}
