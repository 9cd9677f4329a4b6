//! The composition root of a federation: it hosts the registry and the
//! coordinator, waits for the oracle and the worker cohort, and keeps the
//! train and evaluation rounds going until shut down.

pub mod configs;
pub mod discovery;
mod error;
mod session;

use std::{net::SocketAddr, sync::Arc};

use coordinator::{ArtifactStore, TaskManagerPool};
use log::{error, info};
use registry::{
    MemRegistry, Protocol, Registry, ServeError, TaskType, queue::MuxTaskQueue, serve_until,
};
use tokio::{
    net::TcpListener,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;

use configs::OrchestratorConfig;
use discovery::{SubscriberQuery, discover};

pub use error::OrchestratorError;
pub use session::Session;

/// An orchestrator whose listeners are bound but not yet serving.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<MemRegistry>,
    pool: Arc<TaskManagerPool>,
    registry_listener: TcpListener,
    coordinator_listener: TcpListener,
}

impl Orchestrator {
    /// Validates `config` and binds both HTTP listeners.
    ///
    /// # Errors
    /// `InvalidConfig` or the io error of either bind.
    pub async fn bind(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let queue_factory = match config.queue_bound {
            Some(bound) => MuxTaskQueue::bounded_factory(bound),
            None => MuxTaskQueue::factory(),
        };

        let registry_listener = TcpListener::bind(config.registry_addr).await?;
        let coordinator_listener = TcpListener::bind(config.coordinator_addr).await?;

        Ok(Self {
            config,
            registry: Arc::new(MemRegistry::new(queue_factory)),
            pool: Arc::new(TaskManagerPool::new()),
            registry_listener,
            coordinator_listener,
        })
    }

    pub fn registry_addr(&self) -> std::io::Result<SocketAddr> {
        self.registry_listener.local_addr()
    }

    pub fn coordinator_addr(&self) -> std::io::Result<SocketAddr> {
        self.coordinator_listener.local_addr()
    }

    /// Serves both APIs and drives the rounds until `shutdown` is cancelled.
    ///
    /// # Errors
    /// An `OrchestratorError` if the model can't be seeded, the session
    /// can't start or a server fails. Any failure cancels `shutdown` so the
    /// other server stops as well.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), OrchestratorError> {
        let Self {
            config,
            registry,
            pool,
            registry_listener,
            coordinator_listener,
        } = self;

        let grace = config.shutdown_grace();
        let mut servers = JoinSet::new();
        servers.spawn(serve_until(
            registry_listener,
            registry::http::router(registry.clone()),
            shutdown.clone(),
            grace,
        ));
        servers.spawn(serve_until(
            coordinator_listener,
            coordinator::http::router(pool.clone()),
            shutdown.clone(),
            grace,
        ));

        let started = start(&config, registry, &pool, &shutdown).await;
        if started.is_err() {
            shutdown.cancel();
        }
        let _session = started?;

        let mut result = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            Some(joined) = servers.join_next() => {
                shutdown.cancel();
                flatten(joined)
            }
        };
        info!("shutting down");

        while let Some(joined) = servers.join_next().await {
            result = result.and(flatten(joined));
        }

        result
    }
}

fn flatten(
    joined: Result<Result<(), ServeError>, JoinError>,
) -> Result<(), OrchestratorError> {
    let served = joined
        .map_err(|e| OrchestratorError::Io(std::io::Error::other(e)))
        .and_then(|res| res.map_err(OrchestratorError::from));

    if let Err(e) = &served {
        error!("server stopped uncleanly: {e}");
    }
    served
}

/// Seeds the model and waits for the participants.
///
/// # Returns
/// The running session, `None` if cancelled during discovery.
async fn start(
    config: &OrchestratorConfig,
    registry: Arc<MemRegistry>,
    pool: &TaskManagerPool,
    shutdown: &CancellationToken,
) -> Result<Option<Session>, OrchestratorError> {
    let store = Arc::new(ArtifactStore::seed(
        &config.model_folder,
        &config.original_model,
    )?);

    let interval = config.poll_interval();
    let oracle_query = SubscriberQuery {
        group: config.group.clone(),
        task: TaskType::Evaluate,
        protocols: vec![Protocol::Http],
        filters: config.oracle_filter.clone(),
        count: 1,
    };
    let worker_query = SubscriberQuery {
        group: config.group.clone(),
        task: TaskType::Train,
        protocols: vec![Protocol::Http],
        filters: config.worker_filter.clone(),
        count: config.clients,
    };

    let Some(mut oracles) = discover(registry.as_ref(), &oracle_query, interval, shutdown).await
    else {
        return Ok(None);
    };
    let Some(workers) = discover(registry.as_ref(), &worker_query, interval, shutdown).await else {
        return Ok(None);
    };

    let registry: Arc<dyn Registry> = registry;
    let session = Session::start(config, registry, pool, store, oracles.remove(0), workers)?;
    Ok(Some(session))
}
