//! The training barrier: every client of the cohort uploads once per round,
//! the last upload closes the round.

use std::{
    collections::HashMap,
    error::Error,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::{Mutex, MutexGuard},
};

use crate::{ArtifactStore, ByteStream, Payload, TaskError, TaskManager, manager::essence};

const MODEL_MIME: &str = "application/octet-stream";
const ACCEPTED_MIMES: [&str; 3] = [MODEL_MIME, "application/zip", "application/x-npz"];

/// The uploads of a round where every client responded.
#[derive(Debug, Clone)]
pub struct CompletedRound {
    pub round: u64,
    /// `(client, upload path)` in cohort order.
    pub uploads: Vec<(String, PathBuf)>,
}

/// The error a round completion callback can fail with.
pub type RoundError = Box<dyn Error + Send + Sync>;

/// Runs once per round on the blocking pool, while the barrier is held.
pub type OnRoundComplete = Arc<dyn Fn(&CompletedRound) -> Result<(), RoundError> + Send + Sync>;

struct RoundState {
    round: u64,
    responded: HashMap<String, bool>,
}

/// A task manager collecting one model upload per client and round.
pub struct TrainTaskManager {
    clients: Vec<String>,
    uploads: PathBuf,
    store: Arc<ArtifactStore>,
    on_complete: OnRoundComplete,
    state: Mutex<RoundState>,
}

impl TrainTaskManager {
    /// Creates a new `TrainTaskManager`.
    ///
    /// # Arguments
    /// * `clients` - The fixed cohort, every member must upload each round.
    /// * `uploads` - The folder uploads are written to, created if missing.
    /// * `store` - Where the model handed to clients comes from.
    /// * `on_complete` - Runs when the last client of a round uploads.
    pub fn new<P: AsRef<Path>>(
        clients: Vec<String>,
        uploads: P,
        store: Arc<ArtifactStore>,
        on_complete: OnRoundComplete,
    ) -> io::Result<Self> {
        let uploads = uploads.as_ref().to_path_buf();
        std::fs::create_dir_all(&uploads)?;

        let responded = clients.iter().map(|c| (c.clone(), false)).collect();

        Ok(Self {
            clients,
            uploads,
            store,
            on_complete,
            state: Mutex::new(RoundState {
                round: 0,
                responded,
            }),
        })
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }

    /// The amount of rounds completed so far.
    pub async fn round(&self) -> u64 {
        self.state.lock().await.round
    }

    /// Whether `client` uploaded this round, `None` for unknown clients.
    pub async fn responded(&self, client: &str) -> Option<bool> {
        self.state.lock().await.responded.get(client).copied()
    }

    /// The clients still expected to upload this round, in cohort order.
    pub async fn pending(&self) -> Vec<String> {
        let state = self.state.lock().await;
        self.clients
            .iter()
            .filter(|c| !state.responded[c.as_str()])
            .cloned()
            .collect()
    }

    /// Reopens the current round, discarding every upload it received.
    ///
    /// Used to recover a round whose completion callback failed.
    pub async fn reset_round(&self) -> io::Result<()> {
        let mut state = self.state.lock().await;
        self.discard_uploads(&mut state).await?;
        warn!(round = state.round; "round reset");
        Ok(())
    }

    fn upload_path(&self, client: &str) -> PathBuf {
        self.uploads.join(format!("{client}.npz"))
    }

    async fn discard_uploads(&self, state: &mut MutexGuard<'_, RoundState>) -> io::Result<()> {
        for (client, responded) in state.responded.iter_mut() {
            if std::mem::take(responded) {
                remove_if_exists(&self.upload_path(client)).await?;
            }
        }

        Ok(())
    }

    /// Runs the completion callback and opens the next round on success.
    async fn complete_round(&self, state: &mut MutexGuard<'_, RoundState>) -> Result<(), TaskError> {
        let round = CompletedRound {
            round: state.round,
            uploads: self
                .clients
                .iter()
                .map(|c| (c.clone(), self.upload_path(c)))
                .collect(),
        };

        info!(round = round.round, clients = self.clients.len(); "round complete");

        let on_complete = self.on_complete.clone();
        let res = tokio::task::spawn_blocking(move || on_complete(&round)).await;

        let failure = match res {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(msg) = failure {
            error!(round = state.round, error = msg.as_str(); "round completion failed");
            return Err(TaskError::RoundFailed(msg));
        }

        self.discard_uploads(state).await?;
        state.round += 1;
        debug!(round = state.round; "next round open");
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn write_upload(path: &Path, mut body: ByteStream) -> io::Result<u64> {
    let mut file = File::create(path).await?;
    let written = tokio::io::copy(&mut body, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl TaskManager for TrainTaskManager {
    async fn get_payload(&self, client: &str) -> Result<Payload, TaskError> {
        let state = self.state.lock().await;
        if !state.responded.contains_key(client) {
            return Err(TaskError::ClientNotAuthorized(client.to_string()));
        }

        let file = self.store.open_current()?;
        drop(state);

        Ok(Payload {
            mime_type: MODEL_MIME.to_string(),
            data: Box::new(File::from_std(file)),
        })
    }

    fn is_valid_response_type(&self, mime_type: &str) -> bool {
        ACCEPTED_MIMES.contains(&essence(mime_type).as_str())
    }

    async fn register_response(&self, client: &str, response: ByteStream) -> Result<(), TaskError> {
        let mut state = self.state.lock().await;

        match state.responded.get(client) {
            None => return Err(TaskError::ClientNotAuthorized(client.to_string())),
            Some(true) => return Err(TaskError::DuplicateResponse(client.to_string())),
            Some(false) => {}
        }

        let path = self.upload_path(client);
        let written = match write_upload(&path, response).await {
            Ok(written) => written,
            Err(e) => {
                warn!(client = client, error:% = e; "upload failed");
                remove_if_exists(&path).await?;
                return Err(e.into());
            }
        };

        state.responded.insert(client.to_string(), true);
        debug!(client = client, round = state.round, bytes = written; "upload stored");

        if state.responded.values().all(|&responded| responded) {
            self.complete_round(&mut state).await?;
        }

        Ok(())
    }
}
