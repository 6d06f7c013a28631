use crate::database::models::{RequestStatus, RideRequest};
use crate::database::mongodb::{MongoDbClient, RIDE_REQUESTS_COLLECTION};
use crate::database::store::{RideRequestStore, StoreResult};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson};
use chrono::Utc;
use futures::TryStreamExt;
use log::{debug, info};
use mongodb::Collection;
use std::sync::Arc;

/// Ride request repository for MongoDB operations
#[derive(Debug, Clone)]
pub struct RideRequestRepository {
    client: Arc<MongoDbClient>,
}

impl RideRequestRepository {
    /// Create a new RideRequestRepository instance
    pub fn new(client: Arc<MongoDbClient>) -> Self {
        Self { client }
    }

    fn collection(&self) -> Collection<RideRequest> {
        self.client.collection::<RideRequest>(RIDE_REQUESTS_COLLECTION)
    }
}

#[async_trait]
impl RideRequestStore for RideRequestRepository {
    async fn insert(&self, request: &RideRequest) -> StoreResult<()> {
        self.collection().insert_one(request).await?;
        info!(
            "Inserted ride request {} for user {}",
            request.id, request.user_id
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<RideRequest>> {
        let request = self.collection().find_one(doc! { "_id": id }).await?;
        Ok(request)
    }

    async fn find_by_ids(&self, ids: &[ObjectId]) -> StoreResult<Vec<RideRequest>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = doc! { "_id": { "$in": ids.to_vec() } };
        let mut cursor = self.collection().find(filter).await?;
        let mut requests = Vec::new();

        while let Some(request) = cursor.try_next().await? {
            requests.push(request);
        }

        Ok(requests)
    }

    async fn find_by_status(&self, status: RequestStatus) -> StoreResult<Vec<RideRequest>> {
        let filter = doc! { "status": status.as_str() };
        let mut cursor = self.collection().find(filter).sort(doc! { "_id": 1 }).await?;
        let mut requests = Vec::new();

        while let Some(request) = cursor.try_next().await? {
            requests.push(request);
        }

        debug!("Found {} ride requests in status {}", requests.len(), status);
        Ok(requests)
    }

    async fn find_by_user(&self, user_id: &str) -> StoreResult<Vec<RideRequest>> {
        let filter = doc! { "userId": user_id };
        let mut cursor = self.collection().find(filter).sort(doc! { "_id": -1 }).await?;
        let mut requests = Vec::new();

        while let Some(request) = cursor.try_next().await? {
            requests.push(request);
        }

        Ok(requests)
    }

    async fn transition(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> StoreResult<bool> {
        // poolId: null also matches documents where the field is absent
        let filter = doc! {
            "_id": id,
            "status": from.as_str(),
            "poolId": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "status": to.as_str(),
                "updatedAt": Utc::now().timestamp() as i64
            }
        };

        let result = self.collection().update_one(filter, update).await?;

        if result.matched_count > 0 {
            debug!("Ride request {} moved from {} to {}", id, from, to);
            Ok(true)
        } else {
            debug!("Ride request {} is not {}", id, from);
            Ok(false)
        }
    }
}
