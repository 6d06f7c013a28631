use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{Location, RequestStatus, RideRequest};
use crate::handlers::pool::dto::PoolResponse;
use crate::services::lifecycle::RequestStatusView;
use crate::services::Submission;

/// Request model for submitting a ride request
#[derive(Debug, Deserialize)]
pub struct SubmitRideRequest {
    pub source: Location,
    pub destination: Location,
    /// RFC 3339 departure time
    pub time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RideRequestResponse {
    pub id: String,
    pub user_id: String,
    pub source: Location,
    pub destination: Location,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    pub status: RequestStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<RideRequest> for RideRequestResponse {
    fn from(request: RideRequest) -> Self {
        Self {
            id: request.id.to_hex(),
            user_id: request.user_id,
            source: request.source,
            destination: request.destination,
            time: request.time,
            pool_id: request.pool_id.map(|id| id.to_hex()),
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

/// Outcome of a submission, or the current state of a request.
/// `pool` is null while the request is unmatched.
#[derive(Debug, Serialize)]
pub struct RideRequestWithPool {
    pub request: RideRequestResponse,
    pub pool: Option<PoolResponse>,
}

impl From<Submission> for RideRequestWithPool {
    fn from(submission: Submission) -> Self {
        Self {
            request: submission.request.into(),
            pool: submission.pool.map(Into::into),
        }
    }
}

impl From<RequestStatusView> for RideRequestWithPool {
    fn from(view: RequestStatusView) -> Self {
        Self {
            request: view.request.into(),
            pool: view.pool.map(Into::into),
        }
    }
}
