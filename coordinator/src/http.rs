//! The coordinator HTTP API, `GET` pulls a task payload and `POST` pushes
//! its result.

use std::{io, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::TryStreamExt;
use log::warn;
use registry::http::client_token;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::{TaskError, TaskManager, TaskManagerPool};

type SharedPool = Arc<TaskManagerPool>;

/// Failures of a coordinator request.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    UnknownTask(String),
    InvalidContentType(String),
    Task(TaskError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "missing Authorization header").into_response()
            }
            Self::UnknownTask(task) => {
                (StatusCode::NOT_FOUND, format!("unknown task {task}")).into_response()
            }
            Self::InvalidContentType(mime) => (
                StatusCode::BAD_REQUEST,
                format!("invalid content type {mime:?}"),
            )
                .into_response(),
            Self::Task(e) => {
                warn!(error:% = e; "task manager failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

fn resolve<'h>(
    pool: &TaskManagerPool,
    task: &str,
    headers: &'h HeaderMap,
) -> Result<(&'h str, Arc<dyn TaskManager>), ApiError> {
    let client = client_token(headers).ok_or(ApiError::Unauthorized)?;
    let manager = pool
        .get(task)
        .map_err(|_| ApiError::UnknownTask(task.to_string()))?;

    Ok((client, manager))
}

/// Builds the `/task/{token}` routes over `pool`.
pub fn router(pool: SharedPool) -> Router {
    Router::new()
        .route("/task/:token", get(get_payload).post(post_response))
        .with_state(pool)
}

async fn get_payload(
    State(pool): State<SharedPool>,
    Path(task): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (client, manager) = resolve(&pool, &task, &headers)?;
    let payload = manager.get_payload(client).await?;

    let body = Body::from_stream(ReaderStream::new(payload.data));
    Ok(([(header::CONTENT_TYPE, payload.mime_type)], body).into_response())
}

async fn post_response(
    State(pool): State<SharedPool>,
    Path(task): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let (client, manager) = resolve(&pool, &task, &headers)?;

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !manager.is_valid_response_type(mime_type) {
        return Err(ApiError::InvalidContentType(mime_type.to_string()));
    }

    let stream = body.into_data_stream().map_err(io::Error::other);
    manager
        .register_response(client, Box::new(StreamReader::new(stream)))
        .await?;

    Ok(StatusCode::OK)
}
