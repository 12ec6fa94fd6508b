use crate::error::ProxyError;
use axum::body::{Body, Bytes};
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::TryStreamExt;
use futures_util::stream;
use http::HeaderMap;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::io;
use tokio::sync::mpsc;

/// Multipart field carrying the uploaded file.
const RESUME_FIELD: &str = "resume";

/// Chunks buffered between the upstream reader and the outbound body. The
/// capacity bounds relay memory regardless of payload size.
const RELAY_CHANNEL_CAPACITY: usize = 8;

/// Reads the inbound multipart form and rebuilds it as an outbound one,
/// re-attaching the resume's filename, content type, and bytes, plus every
/// other submitted text field.
///
/// A missing `resume` part, or one without the file metadata, is rejected
/// with 400 before anything is sent downstream. The file's byte length is
/// carried on the outbound part; the origin service enforces the actual
/// size ceiling (10 MB per its contract).
pub async fn build_upload_form(
    mut multipart: Multipart,
) -> Result<reqwest::multipart::Form, ProxyError> {
    let mut form = reqwest::multipart::Form::new();
    let mut resume: Option<reqwest::multipart::Part> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| resume_required())?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };

        if name == RESUME_FIELD {
            let filename = field.file_name().map(ToString::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let content = field.bytes().await.map_err(|_| resume_required())?;

            let (Some(filename), Some(content_type)) = (filename, content_type) else {
                return Err(resume_required());
            };

            let part = reqwest::multipart::Part::bytes(content.to_vec())
                .file_name(filename)
                .mime_str(&content_type)
                .map_err(|_| resume_required())?;
            resume = Some(part);
        } else {
            let text = field.text().await.map_err(|_| resume_required())?;
            form = form.text(name, text);
        }
    }

    let Some(resume) = resume else {
        return Err(resume_required());
    };

    Ok(form.part(RESUME_FIELD, resume))
}

/// Pipes an upstream byte stream to the caller through a fixed-capacity
/// channel: a reader task pulls chunks from the upstream connection, the
/// outbound body drains them. A full channel pauses the upstream read, and
/// the caller hanging up drops the receiver, which stops the reader and
/// releases the upstream connection.
///
/// The first chunk is pulled before the response starts, so a stream that
/// dies before yielding anything still gets a JSON error. A failure after
/// that aborts the outbound connection mid-body; no JSON is retrofitted
/// onto bytes already in flight.
pub async fn stream_download(upstream: reqwest::Response) -> Result<Response, ProxyError> {
    let status = upstream.status();
    let relayed_headers = relay_headers(upstream.headers());

    let mut chunks = upstream.bytes_stream();
    let first = match chunks.try_next().await {
        Ok(first) => first,
        Err(err) => {
            tracing::warn!(error = %err, "resume stream failed before the first byte");
            return Err(ProxyError::message(
                StatusCode::BAD_GATEWAY,
                "Invalid upstream stream",
            ));
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(RELAY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut pending = first;
        while let Some(chunk) = pending.take() {
            if tx.send(Ok(chunk)).await.is_err() {
                // Caller went away; stop reading.
                return;
            }

            match chunks.try_next().await {
                Ok(next) => pending = next,
                Err(err) => {
                    tracing::warn!(error = %err, "resume stream failed mid-transfer");
                    let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
                    return;
                }
            }
        }
    });

    let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = relayed_headers;
    Ok(response)
}

/// Only the content headers travel back to the caller; everything else about
/// the upstream response stays internal.
fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [CONTENT_TYPE, CONTENT_DISPOSITION] {
        if let Some(value) = upstream.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers
}

fn resume_required() -> ProxyError {
    ProxyError::message(StatusCode::BAD_REQUEST, "Resume file is required")
}
