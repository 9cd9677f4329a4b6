use std::{error::Error, fmt};

use npz::NpzError;

/// Failures of an aggregation command.
#[derive(Debug)]
pub enum AggregateError {
    /// No model was submitted since the last aggregation.
    NothingToAggregate,
    /// A submission is unreadable or does not match the current aggregate.
    Rejected(NpzError),
    /// The submissions could not be reduced.
    Archive(NpzError),
    /// The reduced archive does not match the shape of its inputs.
    Inconsistent(NpzError),
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToAggregate => write!(f, "no models to aggregate"),
            Self::Rejected(e) => write!(f, "submission rejected: {e}"),
            Self::Archive(e) => write!(f, "aggregation failed: {e}"),
            Self::Inconsistent(e) => write!(f, "aggregated model is inconsistent: {e}"),
        }
    }
}

impl Error for AggregateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NothingToAggregate => None,
            Self::Rejected(e) | Self::Archive(e) | Self::Inconsistent(e) => Some(e),
        }
    }
}

impl From<NpzError> for AggregateError {
    fn from(e: NpzError) -> Self {
        Self::Archive(e)
    }
}
