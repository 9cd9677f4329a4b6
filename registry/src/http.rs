//! The registry HTTP API.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Param, Registry, RegistryError, TaskSubscription, TaskType};

/// The header carrying the caller's group.
pub const GROUP_HEADER: &str = "group";

type SharedRegistry = Arc<dyn Registry>;

/// Reads the caller token from `Authorization`, a `Bearer ` prefix is optional.
pub fn client_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    (!token.is_empty()).then_some(token)
}

fn group(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(GROUP_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}

/// Failures of a registry request, rendered as a status code and a text body.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    Registry(RegistryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::Registry(e) => {
                warn!(error:% = e; "registry request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// The `Group` header of a request.
pub struct Group(pub String);

/// The `(group, token)` pair identifying a registered subscriber.
pub struct Identity {
    pub group: String,
    pub token: String,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Group {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        group(&parts.headers)
            .map(|group| Self(group.to_string()))
            .ok_or(ApiError::Unauthorized("missing Group header"))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let token = client_token(&parts.headers)
            .ok_or(ApiError::Unauthorized("missing Authorization header"))?;
        let group = group(&parts.headers).ok_or(ApiError::Unauthorized("missing Group header"))?;

        Ok(Self {
            group: group.to_string(),
            token: token.to_string(),
        })
    }
}

#[derive(Default, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    params: Vec<Param>,
}

#[derive(Serialize)]
struct RegisterReply {
    token: String,
}

#[derive(Default, Deserialize)]
struct SubscribeBody {
    #[serde(default)]
    tasks: Vec<TaskSubscription>,
}

#[derive(Default, Deserialize)]
struct UnsubscribeBody {
    #[serde(default)]
    tasks: Vec<TaskType>,
}

/// Parses a JSON body, an empty body is the default value.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("malformed body: {e}")))
}

/// Builds the registry routes over `registry`.
pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/task", get(get_task))
        .with_state(registry)
}

async fn register(
    State(registry): State<SharedRegistry>,
    Group(group): Group,
    body: Bytes,
) -> Result<Json<RegisterReply>, ApiError> {
    let RegisterBody { params } = parse_body(&body)?;
    let token = registry.register_subscriber(&group, params)?;

    Ok(Json(RegisterReply { token }))
}

async fn unregister(
    State(registry): State<SharedRegistry>,
    Identity { group, token }: Identity,
) -> Result<StatusCode, ApiError> {
    registry.unregister_subscriber(&group, &token)?;
    Ok(StatusCode::OK)
}

async fn subscribe(
    State(registry): State<SharedRegistry>,
    Identity { group, token }: Identity,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let SubscribeBody { tasks } = parse_body(&body)?;
    if tasks.is_empty() {
        return Err(ApiError::BadRequest("no tasks to subscribe to".to_string()));
    }

    registry.subscribe(&group, &token, &tasks)?;
    Ok(StatusCode::OK)
}

async fn unsubscribe(
    State(registry): State<SharedRegistry>,
    Identity { group, token }: Identity,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let UnsubscribeBody { tasks } = parse_body(&body)?;

    match tasks.is_empty() {
        true => registry.unsubscribe_all(&group, &token)?,
        false => registry.unsubscribe(&group, &token, &tasks)?,
    }

    Ok(StatusCode::OK)
}

async fn get_task(
    State(registry): State<SharedRegistry>,
    Identity { group, token }: Identity,
) -> Result<Response, ApiError> {
    let response = match registry.get_task(&group, &token)? {
        Some(task) => Json(task.as_ref()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };

    Ok(response)
}
