use std::{fs, sync::Arc};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use coordinator::{
    ArtifactStore, ByteStream, OnRoundComplete, Payload, TaskError, TaskManager, TaskManagerPool,
    TrainTaskManager, http,
};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tower::ServiceExt;

/// Records every response it is handed.
#[derive(Default)]
struct Recorder {
    responses: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl TaskManager for Recorder {
    async fn get_payload(&self, client: &str) -> Result<Payload, TaskError> {
        if client == "stranger" {
            return Err(TaskError::ClientNotAuthorized(client.to_string()));
        }

        Ok(Payload {
            mime_type: "text/plain".to_string(),
            data: Box::new(&b"payload for you"[..]),
        })
    }

    fn is_valid_response_type(&self, mime_type: &str) -> bool {
        mime_type == "text/plain"
    }

    async fn register_response(
        &self,
        client: &str,
        mut response: ByteStream,
    ) -> Result<(), TaskError> {
        let mut body = Vec::new();
        response.read_to_end(&mut body).await?;
        self.responses.lock().push((client.to_string(), body));
        Ok(())
    }
}

fn app() -> (Arc<Recorder>, Router) {
    let recorder = Arc::new(Recorder::default());
    let pool = Arc::new(TaskManagerPool::new());
    pool.add("TASK", recorder.clone()).unwrap();

    (recorder, http::router(pool))
}

fn request(method: &str, uri: &str, client: Option<&str>, mime: &str, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, mime);

    if let Some(client) = client {
        builder = builder.header(header::AUTHORIZATION, client);
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn pull_streams_the_payload() {
    let (_, router) = app();

    let req = request("GET", "/task/TASK", Some("client-1"), "", "");
    let response = router.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"payload for you");
}

#[tokio::test]
async fn push_delivers_the_body() {
    let (recorder, router) = app();

    let req = request("POST", "/task/TASK", Some("Bearer client-1"), "text/plain", "result");
    let response = router.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        *recorder.responses.lock(),
        [("client-1".to_string(), b"result".to_vec())]
    );
}

#[tokio::test]
async fn missing_authorization_is_unauthorized() {
    let (_, router) = app();

    let response = router
        .clone()
        .oneshot(request("GET", "/task/TASK", None, "", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(request("POST", "/task/TASK", None, "text/plain", "x"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (_, router) = app();

    let response = router
        .oneshot(request("GET", "/task/NOPE", Some("client-1"), "", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_content_type_never_reaches_the_manager() {
    let (recorder, router) = app();

    let req = request("POST", "/task/TASK", Some("client-1"), "application/json", "{}");
    let response = router.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(recorder.responses.lock().is_empty());
}

#[tokio::test]
async fn manager_errors_are_server_errors() {
    let (_, router) = app();

    let response = router
        .oneshot(request("GET", "/task/TASK", Some("stranger"), "", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("stranger"));
}

#[tokio::test]
async fn training_round_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("original.npz");
    fs::write(&original, "weights").unwrap();
    let store = Arc::new(ArtifactStore::seed(dir.path().join("model"), &original).unwrap());

    let rounds = Arc::new(Mutex::new(Vec::new()));
    let on_complete: OnRoundComplete = {
        let rounds = rounds.clone();
        Arc::new(move |round: &coordinator::CompletedRound| -> Result<(), coordinator::RoundError> {
            rounds.lock().push(round.round);
            Ok(())
        })
    };

    let clients = vec!["w1".to_string(), "w2".to_string()];
    let manager = TrainTaskManager::new(clients, dir.path().join("uploads"), store, on_complete)
        .unwrap();

    let pool = Arc::new(TaskManagerPool::new());
    pool.add("TRAIN_TOKEN", Arc::new(manager)).unwrap();
    let router = http::router(pool);

    let pull = request("GET", "/task/TRAIN_TOKEN", Some("w1"), "", "");
    let response = router.clone().oneshot(pull).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"weights");

    for client in ["w1", "w2"] {
        let push = request(
            "POST",
            "/task/TRAIN_TOKEN",
            Some(client),
            "application/octet-stream",
            "update",
        );
        let response = router.clone().oneshot(push).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let again = request("POST", "/task/TRAIN_TOKEN", Some("w1"), "application/octet-stream", "x");
    assert_eq!(router.clone().oneshot(again).await.unwrap().status(), StatusCode::OK);
    assert_eq!(*rounds.lock(), [0]);
}
