use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{PoolError, TaskManager};

/// The task managers the coordinator serves, by task token.
#[derive(Default)]
pub struct TaskManagerPool {
    managers: RwLock<HashMap<String, Arc<dyn TaskManager>>>,
}

impl TaskManagerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `manager` under `token`.
    ///
    /// # Errors
    /// Returns `PoolError::AlreadyExists` if the token is taken.
    pub fn add(&self, token: &str, manager: Arc<dyn TaskManager>) -> Result<(), PoolError> {
        let mut managers = self.managers.write();
        if managers.contains_key(token) {
            return Err(PoolError::AlreadyExists(token.to_string()));
        }

        managers.insert(token.to_string(), manager);
        Ok(())
    }

    pub fn get(&self, token: &str) -> Result<Arc<dyn TaskManager>, PoolError> {
        self.managers
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| PoolError::NotFound(token.to_string()))
    }

    pub fn remove(&self, token: &str) -> Result<Arc<dyn TaskManager>, PoolError> {
        self.managers
            .write()
            .remove(token)
            .ok_or_else(|| PoolError::NotFound(token.to_string()))
    }
}
