use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::{fs::File, io::AsyncReadExt};

use crate::{ArtifactStore, ByteStream, Payload, TaskError, TaskManager};

const MAX_RESULT_LEN: u64 = 64 * 1024;

/// The metrics an oracle reports after evaluating a model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EvalResult {
    pub accuracy: f64,
    pub loss: f64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub correct: u64,
}

/// An evaluation along with its progress over the previous round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub round: u64,
    pub result: EvalResult,
    /// Relative accuracy change in percent, zero for the baseline round.
    pub delta_percent: f64,
}

/// Runs after every evaluation, once the evaluated model is current.
pub type OnEvaluated = Arc<dyn Fn(&EvalReport) + Send + Sync>;

struct EvalState {
    round: u64,
    prev_accuracy: f64,
}

/// A task manager handing the latest model to an oracle and tracking the
/// accuracy it reports round over round.
///
/// Round 0 evaluates the initial model as a baseline, every later round
/// evaluates the candidate produced by training and promotes it.
pub struct EvalTaskManager {
    store: Arc<ArtifactStore>,
    on_evaluated: OnEvaluated,
    state: Mutex<EvalState>,
}

impl EvalTaskManager {
    pub fn new(store: Arc<ArtifactStore>, on_evaluated: OnEvaluated) -> Self {
        Self {
            store,
            on_evaluated,
            state: Mutex::new(EvalState {
                round: 0,
                prev_accuracy: 0.,
            }),
        }
    }

    /// The amount of evaluations registered so far.
    pub fn round(&self) -> u64 {
        self.state.lock().round
    }

    fn record(&self, result: EvalResult) -> EvalReport {
        let mut state = self.state.lock();

        let delta_percent = match state.round {
            0 => 0.,
            _ if state.prev_accuracy == 0. => 0.,
            _ => (result.accuracy - state.prev_accuracy) / state.prev_accuracy * 100.,
        };

        let report = EvalReport {
            round: state.round,
            result,
            delta_percent,
        };

        state.prev_accuracy = result.accuracy;
        state.round += 1;
        report
    }
}

#[async_trait]
impl TaskManager for EvalTaskManager {
    async fn get_payload(&self, _client: &str) -> Result<Payload, TaskError> {
        let file = self.store.open_latest()?;

        Ok(Payload {
            mime_type: "application/octet-stream".to_string(),
            data: Box::new(File::from_std(file)),
        })
    }

    async fn register_response(&self, client: &str, response: ByteStream) -> Result<(), TaskError> {
        let mut body = Vec::new();
        response.take(MAX_RESULT_LEN).read_to_end(&mut body).await?;

        let result: EvalResult = serde_json::from_slice(&body)
            .map_err(|e| TaskError::MalformedResult(e.to_string()))?;

        if self.round() != 0 {
            self.store.promote()?;
        }
        let report = self.record(result);

        info!(
            client = client, round = report.round, accuracy = result.accuracy, loss = result.loss;
            "[R-{}] Acc: {:.2} ({:+.2}), Loss: {:.2}",
            report.round, result.accuracy, report.delta_percent, result.loss
        );

        (self.on_evaluated)(&report);
        Ok(())
    }
}
