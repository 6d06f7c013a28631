use crate::database::models::{Pool, PoolStatus};
use crate::database::mongodb::{MongoDbClient, POOLS_COLLECTION, RIDE_REQUESTS_COLLECTION};
use crate::database::store::{
    PoolChange, PoolStore, PoolWrite, RequestClaim, StoreError, StoreResult,
};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use log::{debug, info, warn};
use mongodb::{ClientSession, Collection};
use std::sync::Arc;

/// Pool repository for MongoDB operations
///
/// Commits span the `pools` and `ride_requests` collections and run inside a
/// multi-document transaction.
#[derive(Debug, Clone)]
pub struct PoolRepository {
    client: Arc<MongoDbClient>,
}

impl PoolRepository {
    /// Create a new PoolRepository instance
    pub fn new(client: Arc<MongoDbClient>) -> Self {
        Self { client }
    }

    fn collection(&self) -> Collection<Pool> {
        self.client.collection::<Pool>(POOLS_COLLECTION)
    }

    /// Write the pool and every claim on `session`. Any precondition miss
    /// returns a conflict and the caller aborts the transaction.
    async fn apply(&self, change: &PoolChange, session: &mut ClientSession) -> StoreResult<()> {
        let pools = self.collection();
        let pool = &change.pool;

        match change.write {
            PoolWrite::Create => {
                pools.insert_one(pool).session(&mut *session).await?;
            }
            PoolWrite::Update { expected_version } => {
                let filter = doc! {
                    "_id": pool.id,
                    "version": expected_version as i64,
                };
                let result = pools
                    .replace_one(filter, pool)
                    .session(&mut *session)
                    .await?;
                if result.matched_count == 0 {
                    return Err(StoreError::Conflict(format!(
                        "pool {} is no longer at version {}",
                        pool.id, expected_version
                    )));
                }
            }
        }

        let requests = self
            .client
            .collection::<Document>(RIDE_REQUESTS_COLLECTION);
        for claim in &change.claims {
            let result = requests
                .update_one(claim_filter(claim), claim_update(claim, pool.updated_at))
                .session(&mut *session)
                .await?;
            if result.matched_count == 0 {
                return Err(StoreError::Conflict(format!(
                    "ride request {} is no longer {}",
                    claim.request_id, claim.expect_status
                )));
            }
        }

        Ok(())
    }
}

fn claim_filter(claim: &RequestClaim) -> Document {
    let expect_pool = match claim.expect_pool {
        Some(pool_id) => Bson::ObjectId(pool_id),
        None => Bson::Null,
    };
    doc! {
        "_id": claim.request_id,
        "status": claim.expect_status.as_str(),
        "poolId": expect_pool,
    }
}

fn claim_update(claim: &RequestClaim, updated_at: u64) -> Document {
    match claim.pool_id {
        Some(pool_id) => doc! {
            "$set": {
                "status": claim.status.as_str(),
                "poolId": pool_id,
                "updatedAt": updated_at as i64,
            }
        },
        None => doc! {
            "$set": {
                "status": claim.status.as_str(),
                "updatedAt": updated_at as i64,
            },
            "$unset": { "poolId": "" }
        },
    }
}

#[async_trait]
impl PoolStore for PoolRepository {
    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Pool>> {
        let pool = self.collection().find_one(doc! { "_id": id }).await?;
        Ok(pool)
    }

    async fn find_by_member(
        &self,
        user_id: &str,
        statuses: &[PoolStatus],
    ) -> StoreResult<Vec<Pool>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let filter = doc! {
            "members": user_id,
            "status": { "$in": statuses }
        };
        let mut cursor = self
            .collection()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await?;
        let mut pools = Vec::new();

        while let Some(pool) = cursor.try_next().await? {
            pools.push(pool);
        }

        Ok(pools)
    }

    async fn commit(&self, change: &PoolChange) -> StoreResult<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.apply(change, &mut session).await {
            Ok(()) => {
                session.commit_transaction().await?;
                info!(
                    "Committed pool {} ({}, version {}) with {} claims",
                    change.pool.id,
                    change.pool.status,
                    change.pool.version,
                    change.claims.len()
                );
                Ok(())
            }
            Err(e) => {
                debug!("Aborting pool {} transaction: {}", change.pool.id, e);
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(
                        "Failed to abort transaction for pool {}: {}",
                        change.pool.id, abort_err
                    );
                }
                Err(e)
            }
        }
    }
}
