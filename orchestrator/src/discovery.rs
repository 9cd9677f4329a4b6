//! Polls the registry until the subscribers a role needs are online.

use std::time::Duration;

use log::{debug, info};
use registry::{ParamFilter, Protocol, Registry, TaskType};
use tokio_util::sync::CancellationToken;

/// What to look for in the registry.
#[derive(Debug, Clone)]
pub struct SubscriberQuery {
    pub group: String,
    pub task: TaskType,
    pub protocols: Vec<Protocol>,
    pub filters: Vec<ParamFilter>,
    /// The exact amount of subscribers that satisfies the query.
    pub count: usize,
}

/// Queries the registry every `interval` until exactly `query.count`
/// subscribers match.
///
/// # Arguments
/// * `registry` - The registry to query.
/// * `query` - The subscribers to look for.
/// * `interval` - The time between two queries, the first one included.
/// * `cancel` - Stops the search.
///
/// # Returns
/// The matching tokens, or `None` if cancelled first.
pub async fn discover(
    registry: &dyn Registry,
    query: &SubscriberQuery,
    interval: Duration,
    cancel: &CancellationToken,
) -> Option<Vec<String>> {
    info!(
        task:% = query.task,
        count = query.count;
        "waiting for subscribers"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(task:% = query.task; "discovery cancelled");
                return None;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match registry.find_subscribers(
            &query.group,
            query.task,
            &query.protocols,
            &query.filters,
            query.count,
        ) {
            Ok(tokens) if tokens.len() == query.count => {
                info!(task:% = query.task, count = tokens.len(); "subscribers found");
                return Some(tokens);
            }
            Ok(tokens) => {
                debug!(task:% = query.task, found = tokens.len(), count = query.count; "still waiting");
            }
            Err(e) => debug!(task:% = query.task; "no subscribers yet: {e}"),
        }
    }
}
