use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of work a subscriber can be handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Train,
    Predict,
    Evaluate,
}

/// Transports a subscriber can use to reach a task's coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
}

/// Where and how to fetch a task. Queued by reference, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub token: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub host: String,
    pub port: u16,
    pub protocols: Vec<Protocol>,
}

/// A subscriber's interest in one task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubscription {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
}

impl TaskSubscription {
    pub fn new(task_type: TaskType, protocols: &[Protocol]) -> Self {
        Self {
            task_type,
            protocols: protocols.to_vec(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Predict => "predict",
            Self::Evaluate => "evaluate",
        };

        f.write_str(name)
    }
}
