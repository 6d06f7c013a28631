use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::geo::GeoPoint;

/// Lifecycle state of a pool. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Active,
    Completed,
    Cancelled,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Active => "active",
            PoolStatus::Completed => "completed",
            PoolStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PoolStatus::Active)
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool model for MongoDB
///
/// `members[i]` is the requester who submitted `ride_requests[i]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub members: Vec<String>,
    pub ride_requests: Vec<ObjectId>,
    pub pickup_zone: GeoPoint,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub departure_time: DateTime<Utc>,
    pub cost_per_user: i64,
    pub status: PoolStatus,
    /// Bumped on every committed change; guards concurrent leave/complete
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Pool {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// The ride request contributed by `user_id`, if they are a member
    pub fn request_of(&self, user_id: &str) -> Option<ObjectId> {
        self.members
            .iter()
            .position(|m| m == user_id)
            .and_then(|i| self.ride_requests.get(i).copied())
    }
}
