use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::models::{Pool, PoolStatus, RequestStatus, RideRequest};
use super::store::{
    PoolChange, PoolStore, PoolWrite, RideRequestStore, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct State {
    requests: HashMap<ObjectId, RideRequest>,
    pools: HashMap<ObjectId, Pool>,
}

/// Process-local store with the same conditional-write semantics as the
/// MongoDB repositories. Both collections sit behind one lock so a commit is
/// validated and applied without interleaving.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_change(state: &State, change: &PoolChange) -> StoreResult<()> {
    let pool_id = change.pool.id;
    match change.write {
        PoolWrite::Create => {
            if state.pools.contains_key(&pool_id) {
                return Err(StoreError::Conflict(format!("pool {} already exists", pool_id)));
            }
        }
        PoolWrite::Update { expected_version } => match state.pools.get(&pool_id) {
            Some(stored) if stored.version == expected_version => {}
            Some(stored) => {
                return Err(StoreError::Conflict(format!(
                    "pool {} is at version {}, expected {}",
                    pool_id, stored.version, expected_version
                )))
            }
            None => return Err(StoreError::Conflict(format!("pool {} vanished", pool_id))),
        },
    }

    for claim in &change.claims {
        let Some(request) = state.requests.get(&claim.request_id) else {
            return Err(StoreError::Conflict(format!(
                "ride request {} does not exist",
                claim.request_id
            )));
        };
        if request.status != claim.expect_status || request.pool_id != claim.expect_pool {
            return Err(StoreError::Conflict(format!(
                "ride request {} is {} (pool {:?}), expected {}",
                claim.request_id, request.status, request.pool_id, claim.expect_status
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl RideRequestStore for MemoryStore {
    async fn insert(&self, request: &RideRequest) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id) {
            return Err(StoreError::Conflict(format!(
                "ride request {} already exists",
                request.id
            )));
        }
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<RideRequest>> {
        Ok(self.state.read().await.requests.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[ObjectId]) -> StoreResult<Vec<RideRequest>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.requests.get(id).cloned())
            .collect())
    }

    async fn find_by_status(&self, status: RequestStatus) -> StoreResult<Vec<RideRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<RideRequest> = state
            .requests
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        // ObjectIds embed their creation time, which gives submission order
        requests.sort_by_key(|r| r.id);
        Ok(requests)
    }

    async fn find_by_user(&self, user_id: &str) -> StoreResult<Vec<RideRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<RideRequest> = state
            .requests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(requests)
    }

    async fn transition(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(id) {
            Some(request) if request.status == from && request.pool_id.is_none() => {
                request.status = to;
                request.updated_at = Utc::now().timestamp() as u64;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Pool>> {
        Ok(self.state.read().await.pools.get(id).cloned())
    }

    async fn find_by_member(
        &self,
        user_id: &str,
        statuses: &[PoolStatus],
    ) -> StoreResult<Vec<Pool>> {
        let state = self.state.read().await;
        let mut pools: Vec<Pool> = state
            .pools
            .values()
            .filter(|p| p.is_member(user_id) && statuses.contains(&p.status))
            .cloned()
            .collect();
        pools.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pools)
    }

    async fn commit(&self, change: &PoolChange) -> StoreResult<()> {
        let mut state = self.state.write().await;
        check_change(&state, change)?;

        for claim in &change.claims {
            if let Some(request) = state.requests.get_mut(&claim.request_id) {
                request.status = claim.status;
                request.pool_id = claim.pool_id;
                request.updated_at = change.pool.updated_at;
            }
        }
        state.pools.insert(change.pool.id, change.pool.clone());

        debug!(
            "Committed pool {} ({}, version {}) with {} claims",
            change.pool.id,
            change.pool.status,
            change.pool.version,
            change.claims.len()
        );
        Ok(())
    }
}
