use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::TaskError;

/// An owned byte stream flowing to or from a client.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// What a client downloads when it pulls a task.
pub struct Payload {
    pub mime_type: String,
    pub data: ByteStream,
}

/// The coordinator side of one task: hands payloads out and takes results in.
#[async_trait]
pub trait TaskManager: Send + Sync {
    /// Opens the payload `client` should work on.
    ///
    /// # Errors
    /// Returns `TaskError::ClientNotAuthorized` if the client may not take
    /// part in the task, or an io error if the payload cannot be opened.
    async fn get_payload(&self, client: &str) -> Result<Payload, TaskError>;

    /// Whether a result of `mime_type` is acceptable.
    fn is_valid_response_type(&self, _mime_type: &str) -> bool {
        true
    }

    /// Consumes the result `client` produced.
    async fn register_response(&self, client: &str, response: ByteStream) -> Result<(), TaskError>;
}

/// The media type without its parameters, lowercased.
pub(crate) fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
