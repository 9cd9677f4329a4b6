use std::{error::Error, fmt, io, time::Duration};

/// Failures of a task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A bounded queue is at capacity.
    QueueFull { capacity: usize },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { capacity } => write!(f, "task queue is full ({capacity} tasks)"),
        }
    }
}

impl Error for QueueError {}

/// Failures of the subscriber registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    SubscriberNotFound,
    TaskNotSubscribed,
    TaskAlreadySubscribed,
    TokenGeneration,
    QueueOperation(QueueError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberNotFound => write!(f, "subscriber not found"),
            Self::TaskNotSubscribed => write!(f, "task not subscribed"),
            Self::TaskAlreadySubscribed => write!(f, "task already subscribed"),
            Self::TokenGeneration => write!(f, "failed to generate a subscriber token"),
            Self::QueueOperation(e) => write!(f, "queue operation failed: {e}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::QueueOperation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<QueueError> for RegistryError {
    fn from(e: QueueError) -> Self {
        Self::QueueOperation(e)
    }
}

/// Failures of a served HTTP API.
#[derive(Debug)]
pub enum ServeError {
    Io(io::Error),
    /// In-flight requests outlived the shutdown grace period.
    ShutdownTimeout(Duration),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::ShutdownTimeout(grace) => {
                write!(f, "in-flight requests did not finish within {grace:?}")
            }
        }
    }
}

impl Error for ServeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::ShutdownTimeout(_) => None,
        }
    }
}

impl From<io::Error> for ServeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
