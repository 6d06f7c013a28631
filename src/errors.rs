use actix_web::{error::ResponseError, HttpResponse};
use derive_more::Display;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::database::StoreError;

/// Failures of the pooling operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("user {user_id} is not a member of pool {pool_id}")]
    NotAMember { pool_id: String, user_id: String },

    /// A group member was claimed by another pool first
    #[error("ride request claimed concurrently: {0}")]
    ClaimConflict(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store did not respond within {0:?}")]
    Timeout(Duration),

    #[error("invalid input: {0}")]
    Validation(String),
}

impl PoolingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PoolingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn not_a_member(pool_id: impl ToString, user_id: &str) -> Self {
        PoolingError::NotAMember {
            pool_id: pool_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolingError::ClaimConflict(_)
                | PoolingError::StoreUnavailable(_)
                | PoolingError::Timeout(_)
        )
    }
}

impl From<StoreError> for PoolingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(reason) => PoolingError::ClaimConflict(reason),
            StoreError::Unavailable(reason) => PoolingError::StoreUnavailable(reason),
        }
    }
}

#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "Internal server error")]
    InternalError,

    #[display(fmt = "Bad request: {}", _0)]
    BadRequest(String),

    #[display(fmt = "Not found: {}", _0)]
    NotFound(String),

    #[display(fmt = "Forbidden: {}", _0)]
    Forbidden(String),

    #[display(fmt = "Conflict: {}", _0)]
    Conflict(String),

    #[display(fmt = "Service unavailable: {}", _0)]
    ServiceUnavailable(String),

    #[display(fmt = "Unauthorized: {}", _0)]
    Unauthorized(String),
}

impl From<PoolingError> for ApiError {
    fn from(error: PoolingError) -> Self {
        match error {
            PoolingError::NotFound { .. } => ApiError::NotFound(error.to_string()),
            PoolingError::NotAMember { .. } => ApiError::Forbidden(error.to_string()),
            PoolingError::ClaimConflict(_) | PoolingError::InvalidTransition(_) => {
                ApiError::Conflict(error.to_string())
            }
            PoolingError::StoreUnavailable(_) | PoolingError::Timeout(_) => {
                log::error!("Store failure: {}", error);
                ApiError::ServiceUnavailable(error.to_string())
            }
            PoolingError::Validation(message) => ApiError::BadRequest(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        log::error!("Anyhow error: {}", error);
        ApiError::InternalError
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::InternalError => HttpResponse::InternalServerError().json(json!({
                "error": "Internal server error"
            })),
            ApiError::BadRequest(ref message) => HttpResponse::BadRequest().json(json!({
                "error": message
            })),
            ApiError::NotFound(ref message) => HttpResponse::NotFound().json(json!({
                "error": message
            })),
            ApiError::Forbidden(ref message) => HttpResponse::Forbidden().json(json!({
                "error": message
            })),
            ApiError::Conflict(ref message) => HttpResponse::Conflict().json(json!({
                "error": message
            })),
            ApiError::ServiceUnavailable(ref message) => {
                HttpResponse::ServiceUnavailable().json(json!({
                    "error": message,
                    "retryable": true
                }))
            }
            ApiError::Unauthorized(ref message) => HttpResponse::Unauthorized().json(json!({
                "error": message
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn pooling_errors_map_to_status_codes() {
        let cases = [
            (PoolingError::not_found("pool", "abc"), StatusCode::NOT_FOUND),
            (PoolingError::not_a_member("abc", "u1"), StatusCode::FORBIDDEN),
            (
                PoolingError::InvalidTransition("pool is completed".into()),
                StatusCode::CONFLICT,
            ),
            (
                PoolingError::StoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PoolingError::Timeout(Duration::from_secs(5)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PoolingError::Validation("bad latitude".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.error_response().status(), status);
        }
    }

    #[test]
    fn store_conflict_becomes_claim_conflict() {
        let error: PoolingError = StoreError::Conflict("request taken".into()).into();
        assert!(matches!(error, PoolingError::ClaimConflict(_)));
        assert!(error.is_retryable());
        assert!(!PoolingError::not_a_member("p", "u").is_retryable());
    }
}
