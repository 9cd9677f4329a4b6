//! Per-subscriber FIFO task queues.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::{QueueError, TaskDescriptor};

const DEFAULT_CAPACITY: usize = 10;

/// A FIFO of pending tasks, safe to share between request handlers.
pub trait TaskQueue: Send + Sync {
    /// Appends `task` at the back of the queue.
    ///
    /// # Errors
    /// Returns a `QueueError` if the queue cannot take more tasks.
    fn enqueue(&self, task: Arc<TaskDescriptor>) -> Result<(), QueueError>;

    /// Pops the front task without waiting.
    ///
    /// # Returns
    /// `None` if the queue is empty.
    fn dequeue(&self) -> Result<Option<Arc<TaskDescriptor>>, QueueError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the queue every new subscriber gets.
pub type QueueFactory = Arc<dyn Fn() -> Box<dyn TaskQueue> + Send + Sync>;

/// A mutex guarded `VecDeque`, optionally bounded.
#[derive(Debug)]
pub struct MuxTaskQueue {
    tasks: Mutex<VecDeque<Arc<TaskDescriptor>>>,
    bound: Option<usize>,
}

impl MuxTaskQueue {
    /// Creates an unbounded queue.
    ///
    /// # Arguments
    /// * `capacity` - The amount of tasks to preallocate room for.
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
            bound: None,
        }
    }

    /// Creates a queue that rejects tasks once `bound` are pending.
    pub fn bounded(bound: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(bound)),
            bound: Some(bound),
        }
    }

    /// A factory of unbounded queues.
    pub fn factory() -> QueueFactory {
        Arc::new(|| Box::new(MuxTaskQueue::new(DEFAULT_CAPACITY)))
    }

    /// A factory of queues bounded to `bound` tasks.
    pub fn bounded_factory(bound: usize) -> QueueFactory {
        Arc::new(move || Box::new(MuxTaskQueue::bounded(bound)))
    }
}

impl TaskQueue for MuxTaskQueue {
    fn enqueue(&self, task: Arc<TaskDescriptor>) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock();

        match self.bound {
            Some(capacity) if tasks.len() >= capacity => {
                return Err(QueueError::QueueFull { capacity });
            }
            _ => {}
        }

        tasks.push_back(task);
        Ok(())
    }

    fn dequeue(&self) -> Result<Option<Arc<TaskDescriptor>>, QueueError> {
        Ok(self.tasks.lock().pop_front())
    }

    fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Protocol, TaskType};

    fn task(token: &str) -> Arc<TaskDescriptor> {
        Arc::new(TaskDescriptor {
            token: token.into(),
            task_type: TaskType::Train,
            host: "localhost".into(),
            port: 8081,
            protocols: vec![Protocol::Http],
        })
    }

    #[test]
    fn test_fifo_order() {
        let queue = MuxTaskQueue::new(2);
        queue.enqueue(task("a")).unwrap();
        queue.enqueue(task("b")).unwrap();
        queue.enqueue(task("c")).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue().unwrap())
            .map(|task| task.token.clone())
            .collect();

        assert_eq!(order, ["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_dequeue_is_none() {
        let queue = MuxTaskQueue::new(1);
        assert_eq!(queue.dequeue().unwrap(), None);
    }

    #[test]
    fn test_bounded_queue_rejects_overflow() {
        let queue = MuxTaskQueue::bounded(1);
        queue.enqueue(task("a")).unwrap();

        assert_eq!(
            queue.enqueue(task("b")),
            Err(QueueError::QueueFull { capacity: 1 })
        );

        queue.dequeue().unwrap();
        assert!(queue.enqueue(task("b")).is_ok());
    }

    #[test]
    fn test_tasks_are_shared_not_copied() {
        let shared = task("a");
        let queue = MuxTaskQueue::new(1);
        queue.enqueue(shared.clone()).unwrap();

        let popped = queue.dequeue().unwrap().unwrap();
        assert!(Arc::ptr_eq(&shared, &popped));
    }
}
