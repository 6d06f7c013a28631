//! Store doubles for exercising commit failures.

use async_trait::async_trait;
use bson::oid::ObjectId;
use std::time::Duration;

use super::memory::MemoryStore;
use super::models::{Pool, PoolStatus};
use super::store::{PoolChange, PoolStore, StoreError, StoreResult};

/// How [`FaultyPoolStore::commit`] misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Fails before anything is written
    Unavailable,
    /// Never answers; nothing is written
    Hang,
    /// Writes the change, then never acknowledges it
    SlowAck,
}

/// Reads from a [`MemoryStore`]; commits fail as configured
#[derive(Debug, Clone)]
pub struct FaultyPoolStore {
    pub inner: MemoryStore,
    pub fault: CommitFault,
}

const STALL: Duration = Duration::from_secs(60);

#[async_trait]
impl PoolStore for FaultyPoolStore {
    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Pool>> {
        PoolStore::find_by_id(&self.inner, id).await
    }

    async fn find_by_member(
        &self,
        user_id: &str,
        statuses: &[PoolStatus],
    ) -> StoreResult<Vec<Pool>> {
        self.inner.find_by_member(user_id, statuses).await
    }

    async fn commit(&self, change: &PoolChange) -> StoreResult<()> {
        match self.fault {
            CommitFault::Unavailable => {
                Err(StoreError::Unavailable("primary stepped down".to_string()))
            }
            CommitFault::Hang => {
                tokio::time::sleep(STALL).await;
                Err(StoreError::Unavailable("no reply".to_string()))
            }
            CommitFault::SlowAck => {
                self.inner.commit(change).await?;
                tokio::time::sleep(STALL).await;
                Ok(())
            }
        }
    }
}
