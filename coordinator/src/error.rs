use std::{error::Error, fmt, io};

/// Failures a task manager reports back to the calling client.
#[derive(Debug)]
pub enum TaskError {
    /// The client is not part of the task's cohort.
    ClientNotAuthorized(String),
    /// The client already answered in the current round.
    DuplicateResponse(String),
    /// The round completed but its follow-up work failed, the round stays
    /// closed until it is reset.
    RoundFailed(String),
    /// The response body could not be understood.
    MalformedResult(String),
    Io(io::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientNotAuthorized(client) => write!(f, "client {client} is not authorized"),
            Self::DuplicateResponse(client) => {
                write!(f, "client {client} already responded this round")
            }
            Self::RoundFailed(msg) => write!(f, "round failed: {msg}"),
            Self::MalformedResult(msg) => write!(f, "malformed result: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TaskError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Failures of the task manager pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    AlreadyExists(String),
    NotFound(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists(token) => write!(f, "a manager for task {token} already exists"),
            Self::NotFound(token) => write!(f, "no manager for task {token}"),
        }
    }
}

impl Error for PoolError {}
