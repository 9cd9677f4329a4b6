//! A numpy `.npy` / `.npz` codec with streaming element access, and the
//! aggregation engine that averages model archives.

mod aggregate;
mod archive;
mod array;
mod dtype;
mod error;
mod header;

pub use aggregate::{aggregate, check_congruent, mean};
pub use archive::{NpzArchive, NpzWriter};
pub use array::{NpyReader, NpyWriter};
pub use dtype::{ByteOrder, DType, ElementKind};
pub use error::NpzError;
pub use header::NpyHeader;
