use std::{collections::HashMap, fmt};

use coordinator::PoolError;
use registry::{RegistryError, ServeError};

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before anything is started.
    InvalidConfig(String),
    /// One of the HTTP APIs failed or did not shut down in time.
    Serve(ServeError),
    /// A task manager could not be registered.
    Pool(PoolError),
    /// A task could not be queued for some subscribers.
    TaskPush(HashMap<String, RegistryError>),
    /// An underlying I/O error not covered by the above variants.
    Io(std::io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Serve(e) => write!(f, "serve error: {e}"),
            Self::Pool(e) => write!(f, "task pool error: {e}"),
            Self::TaskPush(failures) => {
                write!(f, "task push failed for {} subscriber(s)", failures.len())
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serve(e) => Some(e),
            Self::Pool(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ServeError> for OrchestratorError {
    fn from(e: ServeError) -> Self {
        Self::Serve(e)
    }
}

impl From<PoolError> for OrchestratorError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}
