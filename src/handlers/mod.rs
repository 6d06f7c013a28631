use log::error;
use mongodb::bson::oid::ObjectId;

use crate::errors::ApiError;

pub mod auth;
pub mod notification;
pub mod pool;
pub mod ride_request;

pub use auth::Requester;

/// Parse a path id, rejecting malformed values with 400
pub(crate) fn parse_object_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|e| {
        error!("Invalid ObjectId format: {}", e);
        ApiError::BadRequest(format!("Invalid ID format: {}", e))
    })
}
