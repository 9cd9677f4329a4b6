//! A standalone model aggregation service speaking the length-prefixed
//! stream protocol of `comms`: clients fetch the current aggregate and
//! submit candidates, an operator triggers aggregations on a side channel.

pub mod client;
mod control;
mod error;
mod server;
mod service;

pub use control::{AGGREGATE, run_control};
pub use error::AggregateError;
pub use server::{DEFAULT_MAX_FRAME_LEN, run, serve_connection};
pub use service::AggregatorService;
