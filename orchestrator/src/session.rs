use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use coordinator::{
    ArtifactStore, CompletedRound, EvalReport, EvalTaskManager, RoundError, TaskManagerPool,
    TrainTaskManager,
};
use log::{error, info, warn};
use npz::{NpzArchive, NpzError, NpzWriter};
use registry::{Protocol, Registry, TaskDescriptor, TaskType};

use crate::{OrchestratorError, configs::OrchestratorConfig};

const UPLOADS_DIR: &str = "uploads";

/// The train and eval managers of a running federation, wired so each one
/// hands the next task to the other's participants.
pub struct Session {
    train: Arc<TrainTaskManager>,
    eval: Arc<EvalTaskManager>,
    store: Arc<ArtifactStore>,
}

impl Session {
    /// Registers both task managers in `pool` and queues the baseline
    /// evaluation for the oracle.
    ///
    /// # Arguments
    /// * `config` - Provides the group, the task tokens and the advertised address.
    /// * `registry` - Where tasks are pushed to.
    /// * `pool` - Where the task managers are registered.
    /// * `store` - The models handed out and produced by the rounds.
    /// * `oracle` - The subscriber evaluating every model.
    /// * `workers` - The cohort training every round.
    ///
    /// # Errors
    /// An `OrchestratorError` if either manager can't be set up or the
    /// oracle can't be reached.
    pub fn start(
        config: &OrchestratorConfig,
        registry: Arc<dyn Registry>,
        pool: &TaskManagerPool,
        store: Arc<ArtifactStore>,
        oracle: String,
        workers: Vec<String>,
    ) -> Result<Self, OrchestratorError> {
        let train_task = Arc::new(descriptor(config, &config.train_token, TaskType::Train));
        let eval_task = Arc::new(descriptor(config, &config.eval_token, TaskType::Evaluate));
        let group = config.group.clone();

        let on_complete = {
            let (registry, store, group) = (registry.clone(), store.clone(), group.clone());
            let (oracle, eval_task) = (vec![oracle.clone()], eval_task.clone());

            Arc::new(move |round: &CompletedRound| -> Result<(), RoundError> {
                let staged = store.stage();

                if let Err(e) = average_into(&round.uploads, &staged) {
                    discard(&staged);
                    return Err(e.into());
                }
                let published = match store.publish(&staged) {
                    Ok(published) => published,
                    Err(e) => {
                        discard(&staged);
                        return Err(e.into());
                    }
                };
                info!(round = round.round, version = published.version; "aggregated round");

                let failures = registry.push_task(&group, &oracle, eval_task.clone());
                if !failures.is_empty() {
                    return Err(OrchestratorError::TaskPush(failures).into());
                }
                Ok(())
            })
        };

        let on_evaluated = {
            let (registry, group) = (registry.clone(), group.clone());
            let (workers, train_task) = (workers.clone(), train_task.clone());

            Arc::new(move |report: &EvalReport| {
                let failures = registry.push_task(&group, &workers, train_task.clone());
                for (worker, e) in &failures {
                    error!(round = report.round, worker = worker.as_str(); "train task not queued: {e}");
                }
            })
        };

        let uploads = config.model_folder.join(UPLOADS_DIR);
        let train = Arc::new(TrainTaskManager::new(
            workers,
            uploads,
            store.clone(),
            on_complete,
        )?);
        let eval = Arc::new(EvalTaskManager::new(store.clone(), on_evaluated));

        pool.add(&config.train_token, train.clone())?;
        pool.add(&config.eval_token, eval.clone())?;

        let failures = registry.push_task(&group, &[oracle], eval_task);
        if !failures.is_empty() {
            return Err(OrchestratorError::TaskPush(failures));
        }

        info!(clients = train.clients().len(); "session started, baseline evaluation queued");
        Ok(Self { train, eval, store })
    }

    pub fn train(&self) -> &Arc<TrainTaskManager> {
        &self.train
    }

    pub fn eval(&self) -> &Arc<EvalTaskManager> {
        &self.eval
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }
}

fn descriptor(config: &OrchestratorConfig, token: &str, task_type: TaskType) -> TaskDescriptor {
    TaskDescriptor {
        token: token.to_string(),
        task_type,
        host: config.public_host.clone(),
        port: config.public_port,
        protocols: vec![Protocol::Http],
    }
}

/// Writes the element-wise mean of every upload to `dest`.
fn average_into(uploads: &[(String, PathBuf)], dest: &Path) -> Result<(), NpzError> {
    let mut sources = uploads
        .iter()
        .map(|(_, path)| NpzArchive::open(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = NpzWriter::create(dest)?;
    npz::aggregate(&mut sources, &mut writer, npz::mean)?;
    writer.finish()?;
    Ok(())
}

fn discard(staged: &Path) {
    match fs::remove_file(staged) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            warn!(path:? = staged; "leaving partial aggregate behind: {e}");
        }
        _ => {}
    }
}
