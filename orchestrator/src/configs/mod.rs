//! The orchestrator's configuration, read from a JSON file where every field
//! may be omitted.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use registry::ParamFilter;
use serde::Deserialize;

use crate::OrchestratorError;

/// Everything the orchestrator needs to run a federation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// The registry group every participant registers under.
    pub group: String,
    pub registry_addr: SocketAddr,
    pub coordinator_addr: SocketAddr,
    /// The host advertised in task descriptors.
    pub public_host: String,
    /// The port advertised in task descriptors.
    pub public_port: u16,
    /// The amount of workers a training round waits for.
    pub clients: usize,
    pub model_folder: PathBuf,
    /// The model the first round starts from, copied into `model_folder`.
    pub original_model: PathBuf,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub worker_filter: Vec<ParamFilter>,
    pub oracle_filter: Vec<ParamFilter>,
    pub train_token: String,
    pub eval_token: String,
    /// Caps every subscriber's task queue, unbounded if unset.
    pub queue_bound: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            group: "GROUP_TOKEN".into(),
            registry_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            coordinator_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            public_host: "localhost".into(),
            public_port: 8081,
            clients: 1,
            model_folder: PathBuf::from("./model"),
            original_model: PathBuf::from("./model/original.npz"),
            poll_interval_ms: 1000,
            shutdown_grace_ms: 5000,
            worker_filter: vec![ParamFilter::text_eq("type", "worker")],
            oracle_filter: vec![ParamFilter::text_eq("type", "oracle")],
            train_token: "TRAIN_TOKEN".into(),
            eval_token: "EVAL_TOKEN".into(),
            queue_bound: None,
        }
    }
}

impl OrchestratorConfig {
    /// Reads and validates a config file.
    ///
    /// # Arguments
    /// * `path` - The JSON file to read.
    ///
    /// # Errors
    /// `InvalidConfig` if the file can't be read, parsed or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();

        let raw = fs::read_to_string(path).map_err(|e| {
            OrchestratorError::InvalidConfig(format!("reading {}: {e}", path.display()))
        })?;

        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            OrchestratorError::InvalidConfig(format!("parsing {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |msg: &str| Err(OrchestratorError::InvalidConfig(msg.into()));

        if self.group.is_empty() {
            return invalid("group must not be empty");
        }
        if self.clients == 0 {
            return invalid("clients must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive");
        }
        if self.train_token.is_empty() || self.eval_token.is_empty() {
            return invalid("task tokens must not be empty");
        }
        if self.train_token == self.eval_token {
            return invalid("train_token and eval_token must differ");
        }
        if self.queue_bound == Some(0) {
            return invalid("queue_bound must be positive");
        }
        if self.public_port == 0 {
            return invalid("public_port must be positive");
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_the_default() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.group, "GROUP_TOKEN");
        assert_eq!(config.registry_addr.port(), 8080);
        assert_eq!(config.coordinator_addr.port(), 8081);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.worker_filter, vec![ParamFilter::text_eq("type", "worker")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let raw = r#"{
            "clients": 3,
            "model_folder": "/tmp/models",
            "worker_filter": [{"name": "gpu", "type": "numeric", "value": 1, "operator": "gte"}]
        }"#;
        let config: OrchestratorConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.clients, 3);
        assert_eq!(config.model_folder, PathBuf::from("/tmp/models"));
        assert_eq!(config.worker_filter.len(), 1);
        assert_eq!(config.eval_token, "EVAL_TOKEN");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<OrchestratorConfig>(r#"{"clinets": 2}"#).is_err());
    }

    #[test]
    fn test_validation() {
        let cases = [
            OrchestratorConfig { clients: 0, ..Default::default() },
            OrchestratorConfig { group: String::new(), ..Default::default() },
            OrchestratorConfig { poll_interval_ms: 0, ..Default::default() },
            OrchestratorConfig { eval_token: "TRAIN_TOKEN".into(), ..Default::default() },
            OrchestratorConfig { queue_bound: Some(0), ..Default::default() },
        ];

        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(OrchestratorError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = OrchestratorConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(msg) if msg.contains("reading")));
    }
}
