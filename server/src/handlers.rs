#![allow(clippy::unused_async)]
use std::fmt::Display;
use std::io;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use futures::{Stream, TryStreamExt};
use kernel::{CreateRun, DeleteResult, FileRole, RunCreated, RunList, UploadedFile};
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::AppState;
use crate::domain::{NewFile, Storage};
use crate::file_reply::FileReply;
use crate::memory::MemoryError;

/// Creates an empty run carrying statistics and tags.
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRun>,
) -> Response {
    let mut storage = state.storage.lock().await;
    match storage.create_run(request) {
        Ok(run_id) => {
            tracing::info!("run: {run_id} created");
            (StatusCode::CREATED, Json(RunCreated { run_id })).into_response()
        }
        Err(e) => internal_server_error(&e),
    }
}

/// Adds one file from a multipart form into a run.
pub async fn upload_file(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let mut role: Option<FileRole> = None;
    let mut original_size: Option<u64> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return detail(StatusCode::BAD_REQUEST, e),
        };
        let field_name = field.name().unwrap_or_default().to_owned();
        match field_name.as_str() {
            "role" => match field.text().await {
                Ok(text) => role = text.parse().ok(),
                Err(e) => return detail(StatusCode::BAD_REQUEST, e),
            },
            "original_size" => match field.text().await {
                Ok(text) => original_size = text.trim().parse().ok(),
                Err(e) => return detail(StatusCode::BAD_REQUEST, e),
            },
            "file" => {
                let name = field.file_name().unwrap_or_default().to_owned();
                match read_from_stream(field).await {
                    Ok(data) => file = Some((name, data)),
                    Err(e) => return internal_server_error(&e),
                }
            }
            other => tracing::debug!("field '{other}' ignored"),
        }
    }

    let Some((name, data)) = file else {
        return detail(StatusCode::BAD_REQUEST, "file part is missing");
    };
    if name.is_empty() || name.contains(['/', '\\']) {
        return detail(StatusCode::BAD_REQUEST, format!("invalid file name '{name}'"));
    }
    if state.options.fail_uploads.contains(&name) {
        tracing::error!("file '{name}' rejected by fault injection");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable");
    }

    let read_bytes = data.len();
    let mut storage = state.storage.lock().await;
    let new_file = NewFile {
        name,
        role,
        original_size,
        data,
    };
    match storage.insert_file(&run_id, new_file) {
        Ok(info) => {
            tracing::info!(
                "file: {} read: {read_bytes} file id: {} run: {run_id}",
                info.name,
                info.id
            );
            let uploaded = UploadedFile {
                id: info.id,
                name: info.name,
                size: Some(read_bytes as u64),
                file_url: format!("/files/{}", info.path),
            };
            (StatusCode::CREATED, Json(uploaded)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// Lists all runs
pub async fn get_runs(State(state): State<AppState>) -> Response {
    let storage = state.storage.lock().await;
    match storage.get_runs() {
        Ok(runs) => Json(RunList { runs }).into_response(),
        Err(e) => internal_server_error(&e),
    }
}

pub async fn get_run(Path(run_id): Path<String>, State(state): State<AppState>) -> Response {
    let storage = state.storage.lock().await;
    match storage.get_run(&run_id) {
        Ok(run) => Json(run).into_response(),
        Err(e) => storage_error(e),
    }
}

/// Gets file binary content by its storage path
pub async fn get_file_content(Path(path): Path<String>, State(state): State<AppState>) -> Response {
    let storage = state.storage.lock().await;
    match storage.get_file_data(&path) {
        Ok((info, data)) => {
            tracing::info!("file: {} size: {}", info.path, data.len());
            FileReply::new(data, info).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// Deletes a run with all its files
pub async fn delete_run(Path(run_id): Path<String>, State(state): State<AppState>) -> Response {
    let mut storage = state.storage.lock().await;
    match storage.delete_run(&run_id) {
        Ok(deleted) => {
            tracing::info!(
                "run: {run_id} deleted. The number of files removed {}",
                deleted.files
            );
            Json(deleted).into_response()
        }
        Err(e) => {
            tracing::info!("run '{run_id}' not deleted. Error: {e}");
            (StatusCode::NOT_FOUND, Json(DeleteResult::default())).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct LoginQuery {
    port: u16,
    state: String,
}

/// Browser side of the command line login, hands the configured token to the local callback.
pub async fn cli_login(Query(query): Query<LoginQuery>, State(state): State<AppState>) -> Response {
    let Some(token) = state.options.token.as_deref() else {
        return detail(StatusCode::NOT_FOUND, "login is not enabled");
    };
    let mut callback = match url::Url::parse(&format!("http://127.0.0.1:{}/callback", query.port)) {
        Ok(u) => u,
        Err(e) => return detail(StatusCode::BAD_REQUEST, e),
    };
    callback
        .query_pairs_mut()
        .append_pair("token", token)
        .append_pair("state", &query.state);
    Redirect::to(callback.as_str()).into_response()
}

pub(crate) fn detail<M: Display>(status: StatusCode, message: M) -> Response {
    (
        status,
        Json(serde_json::json!({ "detail": message.to_string() })),
    )
        .into_response()
}

fn storage_error(e: MemoryError) -> Response {
    tracing::info!("{e}");
    detail(StatusCode::NOT_FOUND, e)
}

fn internal_server_error<E: Display>(e: &E) -> Response {
    tracing::error!("{e}");
    detail(StatusCode::INTERNAL_SERVER_ERROR, e)
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<Vec<u8>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    tokio::io::copy(&mut body_reader, &mut buffer).await?;
    Ok(buffer)
}
