//! Storage for saga instances owned by the generic engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};
use crate::saga::Saga;

/// Trait for saga storage.
///
/// `update` applies a mutation atomically with respect to other calls on
/// the same repository. Implementations must not hold their lock across
/// step execution; the orchestrator only calls `update` for short status
/// transitions.
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Registers a new saga.
    async fn insert(&self, saga: Saga) -> Result<()>;

    /// Returns a snapshot of the saga, or `None` if it is not registered.
    async fn get(&self, id: SagaId) -> Result<Option<Saga>>;

    /// Applies `f` to the stored saga and returns its output.
    ///
    /// Fails with [`SagaError::NotFound`] if the saga is not registered.
    async fn update<F, T>(&self, id: SagaId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Saga) -> T + Send,
        T: Send;

    /// Returns snapshots of every registered saga, oldest first.
    async fn list(&self) -> Result<Vec<Saga>>;

    /// Removes a saga in a terminal state, returning it if it was
    /// registered.
    ///
    /// Fails with [`SagaError::InvalidState`] if the saga has not finished.
    async fn remove_terminal(&self, id: SagaId) -> Result<Option<Saga>>;

    /// Removes terminal sagas that reached their terminal state before
    /// `cutoff`. Returns how many were removed.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory saga repository backed by a synchronized map.
///
/// Clones share the same map. Process restart loses all sagas.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    sagas: Arc<RwLock<HashMap<SagaId, Saga>>>,
}

impl InMemorySagaRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered sagas.
    pub async fn len(&self) -> usize {
        self.sagas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sagas.read().await.is_empty()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn insert(&self, saga: Saga) -> Result<()> {
        self.sagas.write().await.insert(saga.id(), saga);
        Ok(())
    }

    async fn get(&self, id: SagaId) -> Result<Option<Saga>> {
        Ok(self.sagas.read().await.get(&id).cloned())
    }

    async fn update<F, T>(&self, id: SagaId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Saga) -> T + Send,
        T: Send,
    {
        let mut sagas = self.sagas.write().await;
        let saga = sagas.get_mut(&id).ok_or(SagaError::NotFound(id))?;
        Ok(f(saga))
    }

    async fn list(&self) -> Result<Vec<Saga>> {
        let mut sagas: Vec<_> = self.sagas.read().await.values().cloned().collect();
        sagas.sort_by_key(|s| s.created_at());
        Ok(sagas)
    }

    async fn remove_terminal(&self, id: SagaId) -> Result<Option<Saga>> {
        let mut sagas = self.sagas.write().await;
        match sagas.get(&id).map(Saga::status) {
            Some(status) if !status.is_terminal() => Err(SagaError::InvalidState {
                expected: "completed or compensated",
                actual: status,
            }),
            _ => Ok(sagas.remove(&id)),
        }
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut sagas = self.sagas.write().await;
        let before = sagas.len();
        sagas.retain(|_, saga| {
            !(saga.status().is_terminal() && saga.completed_at().is_some_and(|at| at < cutoff))
        });
        Ok(before - sagas.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SagaStatus;

    #[tokio::test]
    async fn test_insert_get_remove() {
        let repo = InMemorySagaRepository::new();
        let saga = Saga::new("demo", vec![]).unwrap();
        let id = saga.id();

        repo.insert(saga).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().unwrap().name(), "demo");
        assert_eq!(repo.len().await, 1);

        repo.update(id, |s| s.set_status(SagaStatus::Compensated))
            .await
            .unwrap();
        assert!(repo.remove_terminal(id).await.unwrap().is_some());
        assert!(repo.get(id).await.unwrap().is_none());
        assert!(repo.is_empty().await);
        assert!(repo.remove_terminal(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unfinished_saga_cannot_be_removed() {
        let repo = InMemorySagaRepository::new();
        let saga = Saga::new("demo", vec![]).unwrap();
        let id = saga.id();
        repo.insert(saga).await.unwrap();

        for status in [SagaStatus::Started, SagaStatus::InProgress, SagaStatus::Compensating] {
            repo.update(id, |s| s.set_status(status)).await.unwrap();
            let err = repo.remove_terminal(id).await.unwrap_err();
            assert!(matches!(err, SagaError::InvalidState { actual, .. } if actual == status));
        }
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_saga_is_not_found() {
        let repo = InMemorySagaRepository::new();
        let result = repo.update(SagaId::new(), |s| s.status()).await;
        assert!(matches!(result, Err(SagaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_mutates_in_place() {
        let repo = InMemorySagaRepository::new();
        let saga = Saga::new("demo", vec![]).unwrap();
        let id = saga.id();
        repo.insert(saga).await.unwrap();

        repo.update(id, |s| s.set_status(SagaStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().status(),
            SagaStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_eviction_only_removes_old_terminal_sagas() {
        let repo = InMemorySagaRepository::new();

        let done = Saga::new("done", vec![]).unwrap();
        let running = Saga::new("running", vec![]).unwrap();
        let (done_id, running_id) = (done.id(), running.id());
        repo.insert(done).await.unwrap();
        repo.insert(running).await.unwrap();

        repo.update(done_id, |s| s.set_status(SagaStatus::Completed))
            .await
            .unwrap();
        repo.update(running_id, |s| s.set_status(SagaStatus::InProgress))
            .await
            .unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(repo.evict_terminal_before(past).await.unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(repo.evict_terminal_before(future).await.unwrap(), 1);
        assert!(repo.get(done_id).await.unwrap().is_none());
        assert!(repo.get(running_id).await.unwrap().is_some());
    }
}
