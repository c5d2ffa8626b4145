//! Running a fixed set of workers and collecting their results in order.

use std::fmt;
use std::future::Future;

use tokio::task::{JoinError, JoinSet};

/// A group of tasks whose results are reported in the order the tasks were spawned.
///
/// Every task returns a `Result`. [`join_all`](Self::join_all) stops at the first failure and aborts
/// everything still running. Cancellation is best effort: blocking tasks that already started run
/// to completion in the background, but their results are discarded.
pub struct TaskGroup<T, E> {
    tasks: JoinSet<(usize, Result<T, E>)>,
    spawned: usize,
}

impl<T, E> TaskGroup<T, E>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Spawns an asynchronous task on the current runtime.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.next_index();
        self.tasks.spawn(async move { (index, future.await) });
    }

    /// Spawns a blocking closure on the runtime's blocking thread pool.
    pub fn spawn_blocking<F>(&mut self, f: F)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let index = self.next_index();
        self.tasks.spawn_blocking(move || (index, f()));
    }

    fn next_index(&mut self) -> usize {
        let index = self.spawned;
        self.spawned += 1;
        index
    }

    /// The number of tasks spawned into this group.
    pub fn len(&self) -> usize {
        self.spawned
    }

    /// Returns `true` if no task was spawned.
    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Waits for all tasks and returns their results in spawn order.
    ///
    /// Returns the first error observed, in completion order, after aborting the remaining tasks.
    /// A task that panics or is cancelled is reported through `E::from(JoinError)`.
    pub async fn join_all(mut self) -> Result<Vec<T>, E> {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(self.spawned).collect();

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined
                .map_err(E::from)
                .and_then(|(index, result)| result.map(|value| (index, value)));

            match outcome {
                Ok((index, value)) => slots[index] = Some(value),
                Err(err) => {
                    tracing::debug!(remaining = self.tasks.len(), "aborting remaining tasks");
                    self.tasks.abort_all();
                    return Err(err);
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Waits for all tasks and returns every result in spawn order, failures included.
    pub async fn join_settled(mut self) -> Vec<Result<T, E>> {
        let mut slots: Vec<Option<Result<T, E>>> =
            std::iter::repeat_with(|| None).take(self.spawned).collect();
        let mut lost = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => lost.push(err),
            }
        }

        // a task that failed to join never reported its index; fill the gaps in order
        let mut lost = lost.into_iter();
        slots
            .into_iter()
            .filter_map(|slot| match slot {
                Some(result) => Some(result),
                None => lost.next().map(|err| Err(E::from(err))),
            })
            .collect()
    }
}

impl<T, E> Default for TaskGroup<T, E>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for TaskGroup<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("spawned", &self.spawned)
            .field("running", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn results_follow_spawn_order() {
        let mut group = TaskGroup::<usize, Error>::new();
        for i in 0..8u64 {
            group.spawn(async move {
                // later tasks finish first
                tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
                Ok(i as usize)
            });
        }
        assert_eq!(group.len(), 8);

        let results = group.join_all().await.unwrap();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn first_error_aborts_the_rest() {
        let mut group = TaskGroup::<(), Error>::new();
        group.spawn(async { Err(Error::invalid("boom")) });
        group.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let err = tokio::time::timeout(Duration::from_secs(5), group.join_all())
            .await
            .expect("join_all must not wait for the slow task")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn blocking_tasks_and_panics() {
        let mut group = TaskGroup::<u32, Error>::new();
        group.spawn_blocking(|| Ok(1));
        group.spawn_blocking(|| panic!("worker crashed"));

        let settled = group.join_settled().await;
        assert_eq!(settled.len(), 2);
        assert!(matches!(settled[0], Ok(1)));
        assert!(matches!(settled[1], Err(Error::Join(_))));
    }
}
