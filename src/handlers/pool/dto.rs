use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{Pool, PoolStatus};
use crate::handlers::ride_request::dto::RideRequestResponse;
use crate::matching::geo::GeoPoint;
use crate::services::lifecycle::PoolDetail;

/// Response model for pool API endpoints
#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub id: String, // MongoDB ObjectId as string
    pub members: Vec<String>,
    pub ride_requests: Vec<String>,
    pub pickup_zone: GeoPoint,
    pub departure_time: DateTime<Utc>,
    pub cost_per_user: i64,
    pub status: PoolStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<Pool> for PoolResponse {
    fn from(pool: Pool) -> Self {
        Self {
            id: pool.id.to_hex(),
            members: pool.members,
            ride_requests: pool.ride_requests.iter().map(|id| id.to_hex()).collect(),
            pickup_zone: pool.pickup_zone,
            departure_time: pool.departure_time,
            cost_per_user: pool.cost_per_user,
            status: pool.status,
            created_at: pool.created_at,
            updated_at: pool.updated_at,
        }
    }
}

/// A pool together with its members' requests, in member order
#[derive(Debug, Serialize)]
pub struct PoolDetailResponse {
    #[serde(flatten)]
    pub pool: PoolResponse,
    pub requests: Vec<RideRequestResponse>,
}

impl From<PoolDetail> for PoolDetailResponse {
    fn from(detail: PoolDetail) -> Self {
        Self {
            pool: detail.pool.into(),
            requests: detail.requests.into_iter().map(Into::into).collect(),
        }
    }
}
