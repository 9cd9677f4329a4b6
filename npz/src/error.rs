use std::{error::Error, fmt, io};

/// Every failure the archive codec and the aggregation engine can report.
#[derive(Debug)]
pub enum NpzError {
    Io(io::Error),
    Zip(zip::result::ZipError),
    /// The bytes are not a well formed `.npy` array or `.npz` archive.
    Format(String),
    UnsupportedDtype(String),
    /// Sources disagree on the key set or on the shape of `key`.
    ShapeMismatch { key: String },
    /// Sources disagree on the memory layout of the multi-dimensional `key`.
    LayoutMismatch { key: String },
    MissingKey(String),
    /// An array ran out of elements before its declared shape was covered.
    EndOfArray,
    /// An array writer received a different amount of elements than declared.
    ElementCount { expected: usize, written: usize },
    /// Nothing was given to aggregate.
    Empty,
}

impl NpzError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

impl fmt::Display for NpzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Zip(e) => write!(f, "zip error: {e}"),
            Self::Format(msg) => write!(f, "archive format error: {msg}"),
            Self::UnsupportedDtype(descr) => write!(f, "unsupported dtype {descr:?}"),
            Self::ShapeMismatch { key } => write!(f, "shape mismatch for array {key:?}"),
            Self::LayoutMismatch { key } => write!(f, "memory layout mismatch for array {key:?}"),
            Self::MissingKey(key) => write!(f, "no array named {key:?}"),
            Self::EndOfArray => write!(f, "array data ended before its declared shape"),
            Self::ElementCount { expected, written } => {
                write!(f, "array expects {expected} elements, got {written}")
            }
            Self::Empty => write!(f, "no archives to aggregate"),
        }
    }
}

impl Error for NpzError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Zip(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NpzError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Self::EndOfArray;
        }

        Self::Io(e)
    }
}

impl From<zip::result::ZipError> for NpzError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Zip(e)
    }
}
