use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::config::{MatchingConfig, PricingConfig};
use crate::database::models::{Location, Pool, RequestStatus, RideRequest};
use crate::database::store::RideRequestStore;
use crate::errors::PoolingError;
use crate::matching::{allocate_cost, filter_candidates, select_group};
use crate::services::lifecycle::PoolLifecycleManager;

/// A ride request as submitted by a requester
#[derive(Debug, Clone)]
pub struct NewRideRequest {
    pub user_id: String,
    pub source: Location,
    pub destination: Location,
    pub time: DateTime<Utc>,
}

impl NewRideRequest {
    pub fn validate(&self) -> Result<(), PoolingError> {
        if self.user_id.trim().is_empty() {
            return Err(PoolingError::Validation("user id is required".into()));
        }
        self.source
            .point()
            .validate()
            .map_err(|e| PoolingError::Validation(format!("source: {}", e)))?;
        self.destination
            .point()
            .validate()
            .map_err(|e| PoolingError::Validation(format!("destination: {}", e)))?;
        Ok(())
    }
}

/// Result of a submission: the stored request and the pool it joined, if any
#[derive(Debug, Clone)]
pub struct Submission {
    pub request: RideRequest,
    pub pool: Option<Pool>,
}

/// Accepts ride requests and tries to pool each one with compatible waiting
/// requests as it arrives.
pub struct MatchingEngine {
    requests: Arc<dyn RideRequestStore>,
    lifecycle: Arc<PoolLifecycleManager>,
    matching: MatchingConfig,
    pricing: PricingConfig,
}

impl MatchingEngine {
    pub fn new(
        requests: Arc<dyn RideRequestStore>,
        lifecycle: Arc<PoolLifecycleManager>,
        matching: MatchingConfig,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            requests,
            lifecycle,
            matching,
            pricing,
        }
    }

    /// Store a new waiting request and attempt to match it.
    ///
    /// Only storing the request can fail. A failed or conflicting match
    /// attempt leaves the request waiting, where later arrivals can pick it up.
    pub async fn submit(&self, new_request: NewRideRequest) -> Result<Submission, PoolingError> {
        new_request.validate()?;
        let request = RideRequest::new(
            new_request.user_id,
            new_request.source,
            new_request.destination,
            new_request.time,
        );
        self.requests.insert(&request).await?;
        info!(
            "Accepted ride request {} from {} departing {}",
            request.id, request.user_id, request.time
        );

        let mut pool = self.try_match(&request).await;

        // Reflect claims made by this or a concurrent submission
        let request = match self.requests.find_by_id(&request.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => request,
            Err(e) => {
                warn!("Could not reload ride request {}: {}", request.id, e);
                request
            }
        };
        if pool.is_none() {
            if let Some(pool_id) = request.pool_id {
                pool = self.lifecycle.find_pool(&pool_id).await.ok().flatten();
            }
        }

        Ok(Submission { request, pool })
    }

    async fn try_match(&self, request: &RideRequest) -> Option<Pool> {
        let attempts = self.matching.form_attempts.max(1);
        let mut current = request.clone();

        for attempt in 1..=attempts {
            if attempt > 1 {
                current = match self.requests.find_by_id(&current.id).await {
                    Ok(Some(stored)) => stored,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Matching deferred for {}: {}", current.id, e);
                        return None;
                    }
                };
                if current.status != RequestStatus::Waiting {
                    debug!(
                        "Ride request {} was claimed by a concurrent match",
                        current.id
                    );
                    return None;
                }
            }

            let waiting = match self.requests.find_by_status(RequestStatus::Waiting).await {
                Ok(waiting) => waiting,
                Err(e) => {
                    warn!("Matching deferred for {}: {}", current.id, e);
                    return None;
                }
            };

            let candidates = filter_candidates(&current, &waiting, &self.matching);
            debug!(
                "Ride request {}: {} of {} waiting requests are compatible",
                current.id,
                candidates.len(),
                waiting.len().saturating_sub(1)
            );

            let Some(group) = select_group(&current, candidates, self.matching.max_group_size)
            else {
                debug!("No pool for ride request {}, keeps waiting", current.id);
                return None;
            };

            let cost = allocate_cost(&group, &self.pricing);
            match self.lifecycle.form(&group, &cost).await {
                Ok(pool) => return Some(pool),
                Err(PoolingError::ClaimConflict(reason)) => {
                    warn!(
                        "Match attempt {}/{} for {} lost a claim race: {}",
                        attempt, attempts, current.id, reason
                    );
                }
                Err(e) => {
                    warn!("Matching deferred for {}: {}", current.id, e);
                    return None;
                }
            }
        }

        None
    }

    /// Cancel a request that has not been matched yet
    pub async fn withdraw(
        &self,
        request_id: &ObjectId,
        user_id: &str,
    ) -> Result<RideRequest, PoolingError> {
        let request = self.owned_request(request_id, user_id).await?;
        if request.status != RequestStatus::Waiting {
            return Err(PoolingError::InvalidTransition(format!(
                "ride request {} is {} and cannot be withdrawn",
                request_id, request.status
            )));
        }

        let moved = self
            .requests
            .transition(request_id, RequestStatus::Waiting, RequestStatus::Cancelled)
            .await?;
        if !moved {
            return Err(PoolingError::InvalidTransition(format!(
                "ride request {} was matched before it could be withdrawn",
                request_id
            )));
        }

        info!("Ride request {} withdrawn by {}", request_id, user_id);
        self.owned_request(request_id, user_id).await
    }

    /// Requests submitted by `user_id`, newest first
    pub async fn list_requests(&self, user_id: &str) -> Result<Vec<RideRequest>, PoolingError> {
        Ok(self.requests.find_by_user(user_id).await?)
    }

    async fn owned_request(
        &self,
        request_id: &ObjectId,
        user_id: &str,
    ) -> Result<RideRequest, PoolingError> {
        self.requests
            .find_by_id(request_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| PoolingError::not_found("ride request", request_id))
    }
}
