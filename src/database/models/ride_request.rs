use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::geo::GeoPoint;

/// Lifecycle state of a ride request
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Waiting,
    Matched,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Waiting => "waiting",
            RequestStatus::Matched => "matched",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coordinate with an optional human-readable label
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// RideRequest model for MongoDB
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub source: Location,
    pub destination: Location,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<ObjectId>,
    pub status: RequestStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RideRequest {
    pub fn new(
        user_id: String,
        source: Location,
        destination: Location,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            user_id,
            source,
            destination,
            time,
            pool_id: None,
            status: RequestStatus::Waiting,
            created_at: Utc::now().timestamp() as u64,
            updated_at: Utc::now().timestamp() as u64,
        }
    }
}
