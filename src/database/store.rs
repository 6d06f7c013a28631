//! Storage contracts shared by the MongoDB repositories and the in-memory store.
//!
//! All writes that touch a pool go through [`PoolStore::commit`], which applies
//! a [`PoolChange`] as one unit: either the pool write and every request claim
//! succeed, or nothing is written.

use async_trait::async_trait;
use bson::oid::ObjectId;
use thiserror::Error;

use super::models::{Pool, PoolStatus, RequestStatus, RideRequest};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A conditional write found the document in an unexpected state.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<mongodb::error::Error> for StoreError {
    fn from(error: mongodb::error::Error) -> Self {
        if error.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
            StoreError::Conflict(error.to_string())
        } else {
            StoreError::Unavailable(error.to_string())
        }
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(error: bson::ser::Error) -> Self {
        StoreError::Unavailable(format!("failed to encode document: {}", error))
    }
}

/// How the pool document of a [`PoolChange`] is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolWrite {
    /// Insert a new pool; fails if the id already exists
    Create,
    /// Replace the stored pool only if its version still equals `expected_version`
    Update { expected_version: u64 },
}

/// A conditional status change of one ride request.
///
/// Applied only when the stored request still has `expect_status` and
/// `expect_pool`; otherwise the whole change is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestClaim {
    pub request_id: ObjectId,
    pub expect_status: RequestStatus,
    pub expect_pool: Option<ObjectId>,
    pub status: RequestStatus,
    pub pool_id: Option<ObjectId>,
}

/// One atomic pool mutation: the new pool document plus the request claims
/// that keep requests consistent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolChange {
    pub pool: Pool,
    pub write: PoolWrite,
    pub claims: Vec<RequestClaim>,
}

#[async_trait]
pub trait RideRequestStore: Send + Sync {
    async fn insert(&self, request: &RideRequest) -> StoreResult<()>;

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<RideRequest>>;

    async fn find_by_ids(&self, ids: &[ObjectId]) -> StoreResult<Vec<RideRequest>>;

    /// Requests in `status`, oldest submission first
    async fn find_by_status(&self, status: RequestStatus) -> StoreResult<Vec<RideRequest>>;

    /// Requests submitted by `user_id`, newest first
    async fn find_by_user(&self, user_id: &str) -> StoreResult<Vec<RideRequest>>;

    /// Move a request that is not attached to any pool from `from` to `to`.
    /// Returns `false` when the request was not in `from` (or is pooled).
    async fn transition(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Pool>>;

    /// Pools that list `user_id` as a member and are in one of `statuses`
    async fn find_by_member(
        &self,
        user_id: &str,
        statuses: &[PoolStatus],
    ) -> StoreResult<Vec<Pool>>;

    /// Apply `change` atomically. Returns [`StoreError::Conflict`] if the pool
    /// version or any claim precondition no longer holds.
    async fn commit(&self, change: &PoolChange) -> StoreResult<()>;
}
