//! The task registry: subscriber membership, discovery and the per
//! subscriber task queues, with the HTTP API clients poll.

mod error;
pub mod http;
mod params;
pub mod queue;
mod registry;
mod serve;
mod task;

pub use error::{QueueError, RegistryError, ServeError};
pub use params::{Operator, Param, ParamFilter, ParamValue};
pub use registry::{MemRegistry, Registry};
pub use serve::serve_until;
pub use task::{Protocol, TaskDescriptor, TaskSubscription, TaskType};
