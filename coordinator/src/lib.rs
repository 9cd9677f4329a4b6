//! The task coordinator: the managers behind each task token, the model
//! artifacts they serve and the HTTP API clients pull tasks from.

mod artifacts;
mod error;
mod eval;
pub mod http;
mod manager;
mod pool;
mod train;

pub use artifacts::{ArtifactStore, ModelVersion};
pub use error::{PoolError, TaskError};
pub use eval::{EvalReport, EvalResult, EvalTaskManager, OnEvaluated};
pub use manager::{ByteStream, Payload, TaskManager};
pub use pool::TaskManagerPool;
pub use train::{CompletedRound, OnRoundComplete, RoundError, TrainTaskManager};
