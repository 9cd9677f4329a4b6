//! The subscriber registry: membership, subscriptions, discovery and task
//! delivery, all scoped by group.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use log::{debug, info, warn};
use parking_lot::RwLock;
use rand::{TryRngCore, rngs::OsRng};

use crate::{
    Param, ParamFilter, Protocol, RegistryError, TaskDescriptor, TaskSubscription, TaskType,
    queue::{MuxTaskQueue, QueueFactory, TaskQueue},
};

const TOKEN_BYTES: usize = 16;

/// The operations a registry backend offers, every subscriber is addressed by
/// its `(group, token)` pair.
pub trait Registry: Send + Sync {
    /// Adds a subscriber to `group`.
    ///
    /// # Returns
    /// The freshly generated subscriber token.
    fn register_subscriber(&self, group: &str, params: Vec<Param>) -> Result<String, RegistryError>;

    fn unregister_subscriber(&self, group: &str, token: &str) -> Result<(), RegistryError>;

    /// Subscribes to every task type in `tasks`, or to none of them.
    ///
    /// # Errors
    /// `TaskAlreadySubscribed` if any type is already subscribed or repeated.
    fn subscribe(
        &self,
        group: &str,
        token: &str,
        tasks: &[TaskSubscription],
    ) -> Result<(), RegistryError>;

    fn unsubscribe(&self, group: &str, token: &str, tasks: &[TaskType])
    -> Result<(), RegistryError>;

    fn unsubscribe_all(&self, group: &str, token: &str) -> Result<(), RegistryError>;

    /// Lists up to `max` subscribers of `task` whose parameters pass every
    /// filter, `max == 0` means no bound.
    ///
    /// # Errors
    /// `SubscriberNotFound` if nothing matches.
    fn find_subscribers(
        &self,
        group: &str,
        task: TaskType,
        protocols: &[Protocol],
        filters: &[ParamFilter],
        max: usize,
    ) -> Result<Vec<String>, RegistryError>;

    /// Pops the subscriber's next task without waiting.
    fn get_task(
        &self,
        group: &str,
        token: &str,
    ) -> Result<Option<Arc<TaskDescriptor>>, RegistryError>;

    /// Queues `task` for every subscriber in `tokens`.
    ///
    /// # Returns
    /// The failures per token, an empty map means every token got the task.
    fn push_task(
        &self,
        group: &str,
        tokens: &[String],
        task: Arc<TaskDescriptor>,
    ) -> HashMap<String, RegistryError>;
}

struct Subscriber {
    params: HashMap<String, Param>,
    subscribed: HashMap<TaskType, Vec<Protocol>>,
    queue: Box<dyn TaskQueue>,
}

impl Subscriber {
    fn matches(&self, task: TaskType, protocols: &[Protocol], filters: &[ParamFilter]) -> bool {
        let Some(supported) = self.subscribed.get(&task) else {
            return false;
        };

        if !protocols.is_empty() && !protocols.iter().any(|p| supported.contains(p)) {
            return false;
        }

        filters.iter().all(|filter| {
            self.params
                .get(&filter.name)
                .is_some_and(|param| filter.matches(param))
        })
    }
}

/// An in-memory registry guarded by a single reader-writer lock, each
/// subscriber queue has its own lock.
pub struct MemRegistry {
    groups: RwLock<HashMap<String, HashMap<String, Subscriber>>>,
    queue_factory: QueueFactory,
}

impl Default for MemRegistry {
    fn default() -> Self {
        Self::new(MuxTaskQueue::factory())
    }
}

impl MemRegistry {
    /// Creates a new `MemRegistry`.
    ///
    /// # Arguments
    /// * `queue_factory` - Builds the task queue of every new subscriber.
    pub fn new(queue_factory: QueueFactory) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            queue_factory,
        }
    }

    fn generate_token() -> Result<String, RegistryError> {
        let mut bytes = [0; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| RegistryError::TokenGeneration)?;

        Ok(hex::encode(bytes))
    }

    fn with_subscriber<T>(
        &self,
        group: &str,
        token: &str,
        f: impl FnOnce(&mut Subscriber) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut groups = self.groups.write();
        let subscriber = groups
            .get_mut(group)
            .and_then(|subscribers| subscribers.get_mut(token))
            .ok_or(RegistryError::SubscriberNotFound)?;

        f(subscriber)
    }
}

impl Registry for MemRegistry {
    fn register_subscriber(&self, group: &str, params: Vec<Param>) -> Result<String, RegistryError> {
        let token = Self::generate_token()?;
        let params = params.into_iter().map(|p| (p.name.clone(), p)).collect();

        let subscriber = Subscriber {
            params,
            subscribed: HashMap::new(),
            queue: (self.queue_factory)(),
        };

        self.groups
            .write()
            .entry(group.to_string())
            .or_default()
            .insert(token.clone(), subscriber);

        info!(group = group; "registered subscriber");
        Ok(token)
    }

    fn unregister_subscriber(&self, group: &str, token: &str) -> Result<(), RegistryError> {
        let mut groups = self.groups.write();
        let subscribers = groups
            .get_mut(group)
            .ok_or(RegistryError::SubscriberNotFound)?;

        subscribers
            .remove(token)
            .ok_or(RegistryError::SubscriberNotFound)?;

        if subscribers.is_empty() {
            groups.remove(group);
        }

        info!(group = group; "unregistered subscriber");
        Ok(())
    }

    fn subscribe(
        &self,
        group: &str,
        token: &str,
        tasks: &[TaskSubscription],
    ) -> Result<(), RegistryError> {
        self.with_subscriber(group, token, |subscriber| {
            let mut seen = HashSet::with_capacity(tasks.len());

            for sub in tasks {
                if subscriber.subscribed.contains_key(&sub.task_type) || !seen.insert(sub.task_type)
                {
                    return Err(RegistryError::TaskAlreadySubscribed);
                }
            }

            for sub in tasks {
                subscriber
                    .subscribed
                    .insert(sub.task_type, sub.protocols.clone());
            }

            Ok(())
        })
    }

    fn unsubscribe(
        &self,
        group: &str,
        token: &str,
        tasks: &[TaskType],
    ) -> Result<(), RegistryError> {
        self.with_subscriber(group, token, |subscriber| {
            for task in tasks {
                subscriber.subscribed.remove(task);
            }

            Ok(())
        })
    }

    fn unsubscribe_all(&self, group: &str, token: &str) -> Result<(), RegistryError> {
        self.with_subscriber(group, token, |subscriber| {
            subscriber.subscribed.clear();
            Ok(())
        })
    }

    fn find_subscribers(
        &self,
        group: &str,
        task: TaskType,
        protocols: &[Protocol],
        filters: &[ParamFilter],
        max: usize,
    ) -> Result<Vec<String>, RegistryError> {
        let groups = self.groups.read();
        let limit = if max == 0 { usize::MAX } else { max };

        let tokens: Vec<String> = groups
            .get(group)
            .into_iter()
            .flatten()
            .filter(|(_, subscriber)| subscriber.matches(task, protocols, filters))
            .map(|(token, _)| token.clone())
            .take(limit)
            .collect();

        if tokens.is_empty() {
            return Err(RegistryError::SubscriberNotFound);
        }

        Ok(tokens)
    }

    fn get_task(
        &self,
        group: &str,
        token: &str,
    ) -> Result<Option<Arc<TaskDescriptor>>, RegistryError> {
        let groups = self.groups.read();
        let subscriber = groups
            .get(group)
            .and_then(|subscribers| subscribers.get(token))
            .ok_or(RegistryError::SubscriberNotFound)?;

        Ok(subscriber.queue.dequeue()?)
    }

    fn push_task(
        &self,
        group: &str,
        tokens: &[String],
        task: Arc<TaskDescriptor>,
    ) -> HashMap<String, RegistryError> {
        let groups = self.groups.read();
        let subscribers = groups.get(group);

        let mut errors = HashMap::new();
        let mut targets = Vec::with_capacity(tokens.len());

        for token in tokens {
            match subscribers.and_then(|subscribers| subscribers.get(token)) {
                None => {
                    errors.insert(token.clone(), RegistryError::SubscriberNotFound);
                }
                Some(subscriber) if !subscriber.subscribed.contains_key(&task.task_type) => {
                    errors.insert(token.clone(), RegistryError::TaskNotSubscribed);
                }
                Some(subscriber) => targets.push((token, subscriber)),
            }
        }

        if !errors.is_empty() {
            warn!(group = group, failed = errors.len(); "task push rejected");
            return errors;
        }

        for (token, subscriber) in targets {
            if let Err(e) = subscriber.queue.enqueue(task.clone()) {
                warn!(group = group, error:% = e; "task enqueue failed");
                return HashMap::from([(token.clone(), e.into())]);
            }
        }

        debug!(group = group, task:% = task.task_type, subscribers = tokens.len(); "task pushed");
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "GROUP_TOKEN";

    fn subscribe_to(registry: &MemRegistry, group: &str, params: Vec<Param>, task: TaskType) -> String {
        let token = registry.register_subscriber(group, params).unwrap();
        registry
            .subscribe(group, &token, &[TaskSubscription::new(task, &[Protocol::Http])])
            .unwrap();
        token
    }

    fn descriptor(task_type: TaskType) -> Arc<TaskDescriptor> {
        Arc::new(TaskDescriptor {
            token: "TRAIN_TOKEN".into(),
            task_type,
            host: "localhost".into(),
            port: 8081,
            protocols: vec![Protocol::Http],
        })
    }

    #[test]
    fn test_tokens_are_hex_and_unique() {
        let registry = MemRegistry::default();
        let a = registry.register_subscriber(GROUP, vec![]).unwrap();
        let b = registry.register_subscriber(GROUP, vec![]).unwrap();

        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_unregister_only_touches_its_group() {
        let registry = MemRegistry::default();
        let token = subscribe_to(&registry, GROUP, vec![], TaskType::Train);

        assert_eq!(
            registry.unregister_subscriber("OTHER", &token),
            Err(RegistryError::SubscriberNotFound)
        );
        assert!(registry.get_task(GROUP, &token).is_ok());

        registry.unregister_subscriber(GROUP, &token).unwrap();
        assert_eq!(
            registry.get_task(GROUP, &token),
            Err(RegistryError::SubscriberNotFound)
        );
    }

    #[test]
    fn test_subscribe_is_all_or_nothing() {
        let registry = MemRegistry::default();
        let token = subscribe_to(&registry, GROUP, vec![], TaskType::Train);

        let batch = [
            TaskSubscription::new(TaskType::Evaluate, &[Protocol::Http]),
            TaskSubscription::new(TaskType::Train, &[Protocol::Http]),
        ];
        assert_eq!(
            registry.subscribe(GROUP, &token, &batch),
            Err(RegistryError::TaskAlreadySubscribed)
        );

        let found = registry.find_subscribers(GROUP, TaskType::Evaluate, &[], &[], 0);
        assert_eq!(found, Err(RegistryError::SubscriberNotFound));
    }

    #[test]
    fn test_subscribe_rejects_repeats_within_a_batch() {
        let registry = MemRegistry::default();
        let token = registry.register_subscriber(GROUP, vec![]).unwrap();

        let batch = [
            TaskSubscription::new(TaskType::Predict, &[]),
            TaskSubscription::new(TaskType::Predict, &[]),
        ];
        assert_eq!(
            registry.subscribe(GROUP, &token, &batch),
            Err(RegistryError::TaskAlreadySubscribed)
        );
        assert!(registry.subscribe(GROUP, &token, &batch[..1]).is_ok());
    }

    #[test]
    fn test_unknown_subscriber() {
        let registry = MemRegistry::default();
        let sub = [TaskSubscription::new(TaskType::Train, &[])];

        assert_eq!(
            registry.subscribe(GROUP, "nope", &sub),
            Err(RegistryError::SubscriberNotFound)
        );
        assert_eq!(
            registry.unsubscribe(GROUP, "nope", &[TaskType::Train]),
            Err(RegistryError::SubscriberNotFound)
        );
        assert_eq!(
            registry.unsubscribe_all(GROUP, "nope"),
            Err(RegistryError::SubscriberNotFound)
        );
    }

    #[test]
    fn test_find_subscribers_filters_and_bounds() {
        let registry = MemRegistry::default();
        let worker = || vec![Param::text("type", "worker")];

        for _ in 0..5 {
            subscribe_to(&registry, GROUP, worker(), TaskType::Train);
        }
        let oracle = subscribe_to(
            &registry,
            GROUP,
            vec![Param::text("type", "oracle")],
            TaskType::Train,
        );
        subscribe_to(&registry, "OTHER", worker(), TaskType::Train);

        let filter = [ParamFilter::text_eq("type", "worker")];

        let all = registry
            .find_subscribers(GROUP, TaskType::Train, &[Protocol::Http], &filter, 0)
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(!all.contains(&oracle));

        let three = registry
            .find_subscribers(GROUP, TaskType::Train, &[], &filter, 3)
            .unwrap();
        assert_eq!(three.len(), 3);

        let oracles = registry
            .find_subscribers(
                GROUP,
                TaskType::Train,
                &[],
                &[ParamFilter::text_eq("type", "oracle")],
                10,
            )
            .unwrap();
        assert_eq!(oracles, [oracle]);
    }

    #[test]
    fn test_find_subscribers_requires_a_shared_protocol() {
        let registry = MemRegistry::default();
        let token = registry.register_subscriber(GROUP, vec![]).unwrap();
        registry
            .subscribe(GROUP, &token, &[TaskSubscription::new(TaskType::Train, &[])])
            .unwrap();

        assert!(
            registry
                .find_subscribers(GROUP, TaskType::Train, &[Protocol::Http], &[], 0)
                .is_err()
        );
        assert!(
            registry
                .find_subscribers(GROUP, TaskType::Train, &[], &[], 0)
                .is_ok()
        );
    }

    #[test]
    fn test_unsubscribed_tasks_stop_matching() {
        let registry = MemRegistry::default();
        let token = subscribe_to(&registry, GROUP, vec![], TaskType::Train);

        registry.unsubscribe(GROUP, &token, &[TaskType::Train]).unwrap();
        assert!(
            registry
                .find_subscribers(GROUP, TaskType::Train, &[], &[], 0)
                .is_err()
        );
    }

    #[test]
    fn test_push_then_get_is_fifo() {
        let registry = MemRegistry::default();
        let token = subscribe_to(&registry, GROUP, vec![], TaskType::Train);
        registry
            .subscribe(GROUP, &token, &[TaskSubscription::new(TaskType::Evaluate, &[])])
            .unwrap();

        let tokens = [token.clone()];
        assert!(registry.push_task(GROUP, &tokens, descriptor(TaskType::Train)).is_empty());
        assert!(registry.push_task(GROUP, &tokens, descriptor(TaskType::Evaluate)).is_empty());

        let first = registry.get_task(GROUP, &token).unwrap().unwrap();
        let second = registry.get_task(GROUP, &token).unwrap().unwrap();
        assert_eq!(first.task_type, TaskType::Train);
        assert_eq!(second.task_type, TaskType::Evaluate);
        assert_eq!(registry.get_task(GROUP, &token).unwrap(), None);
    }

    #[test]
    fn test_push_validation_failure_enqueues_nothing() {
        let registry = MemRegistry::default();
        let good = subscribe_to(&registry, GROUP, vec![], TaskType::Train);
        let wrong_task = subscribe_to(&registry, GROUP, vec![], TaskType::Evaluate);

        let tokens = [good.clone(), wrong_task.clone(), "ghost".to_string()];
        let errors = registry.push_task(GROUP, &tokens, descriptor(TaskType::Train));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[&wrong_task], RegistryError::TaskNotSubscribed);
        assert_eq!(errors["ghost"], RegistryError::SubscriberNotFound);
        assert_eq!(registry.get_task(GROUP, &good).unwrap(), None);
    }

    #[test]
    fn test_push_enqueue_failure_is_fail_fast() {
        let registry = MemRegistry::new(MuxTaskQueue::bounded_factory(1));
        let first = subscribe_to(&registry, GROUP, vec![], TaskType::Train);
        let full = subscribe_to(&registry, GROUP, vec![], TaskType::Train);
        let last = subscribe_to(&registry, GROUP, vec![], TaskType::Train);

        let only_full = [full.clone()];
        assert!(registry.push_task(GROUP, &only_full, descriptor(TaskType::Train)).is_empty());

        let tokens = [first.clone(), full.clone(), last.clone()];
        let errors = registry.push_task(GROUP, &tokens, descriptor(TaskType::Train));

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[&full], RegistryError::QueueOperation(_)));

        // Earlier enqueues stay, later tokens are never reached.
        assert!(registry.get_task(GROUP, &first).unwrap().is_some());
        assert_eq!(registry.get_task(GROUP, &last).unwrap(), None);
    }
}
