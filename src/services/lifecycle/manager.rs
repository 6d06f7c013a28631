use bson::oid::ObjectId;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;

use super::transitions::{self, Transition};
use crate::config::LifecycleConfig;
use crate::database::models::{Pool, PoolStatus, RideRequest};
use crate::database::service::Stores;
use crate::database::store::{PoolChange, PoolStore, RideRequestStore};
use crate::errors::PoolingError;
use crate::matching::cost::CostBreakdown;
use crate::services::notification_handler::{Notification, NotificationPublisher};

/// A request's status together with the pool it belongs to, if any
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStatusView {
    pub request: RideRequest,
    pub pool: Option<Pool>,
}

/// A pool with the ride requests of its current members
#[derive(Debug, Clone, PartialEq)]
pub struct PoolDetail {
    pub pool: Pool,
    pub requests: Vec<RideRequest>,
}

/// Owns every write that changes pool membership or pool state.
///
/// Writes are computed by the pure functions in [`transitions`] and committed
/// through [`PoolStore::commit`]; notifications go out only after the commit
/// succeeded.
pub struct PoolLifecycleManager {
    requests: Arc<dyn RideRequestStore>,
    pools: Arc<dyn PoolStore>,
    publisher: Arc<dyn NotificationPublisher>,
    config: LifecycleConfig,
}

impl PoolLifecycleManager {
    pub fn new(
        stores: &Stores,
        publisher: Arc<dyn NotificationPublisher>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            requests: stores.requests.clone(),
            pools: stores.pools.clone(),
            publisher,
            config,
        }
    }

    /// Commit `change`, giving up after the configured timeout.
    ///
    /// A commit is all-or-nothing, so a timeout never leaves partial state.
    /// It can still land on the server after the client stopped waiting. The
    /// pool is therefore re-read once: if it already holds exactly
    /// `change.pool` the commit is reported as applied. A commit that lands
    /// after that re-read is still reported as `Timeout`, and its
    /// notifications are not sent.
    async fn commit(&self, change: &PoolChange) -> Result<(), PoolingError> {
        let timeout = self.config.commit_timeout();
        match tokio::time::timeout(timeout, self.pools.commit(change)).await {
            Ok(result) => result.map_err(PoolingError::from),
            Err(_) => {
                warn!("Commit of pool {} timed out after {:?}", change.pool.id, timeout);
                if self.landed(&change.pool).await {
                    info!("Commit of pool {} landed despite the timeout", change.pool.id);
                    return Ok(());
                }
                Err(PoolingError::Timeout(timeout))
            }
        }
    }

    /// Whether the store already holds `pool` as written by a commit
    async fn landed(&self, pool: &Pool) -> bool {
        let read = self.pools.find_by_id(&pool.id);
        match tokio::time::timeout(self.config.commit_timeout(), read).await {
            Ok(Ok(Some(stored))) => stored == *pool,
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                warn!("Could not re-read pool {} after timeout: {}", pool.id, e);
                false
            }
            Err(_) => false,
        }
    }

    async fn publish_all(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.publisher.publish(notification).await;
        }
    }

    /// Commit a transition and publish its notifications
    async fn apply(&self, transition: Transition) -> Result<Pool, PoolingError> {
        self.commit(&transition.change).await?;
        let Transition {
            change,
            notifications,
        } = transition;
        self.publish_all(notifications).await;
        Ok(change.pool)
    }

    /// Load a pool and apply the transition computed from it, re-reading and
    /// recomputing when a concurrent change wins the race.
    async fn update_pool<F>(&self, pool_id: &ObjectId, step: F) -> Result<Pool, PoolingError>
    where
        F: Fn(Option<Pool>) -> Result<Transition, PoolingError>,
    {
        let attempts = self.config.commit_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let pool = self.pools.find_by_id(pool_id).await?;
            let transition = step(pool)?;
            match self.apply(transition).await {
                Ok(pool) => return Ok(pool),
                Err(PoolingError::ClaimConflict(reason)) => {
                    debug!(
                        "Pool {} changed concurrently (attempt {}/{}): {}",
                        pool_id, attempt, attempts, reason
                    );
                    last_error = Some(PoolingError::ClaimConflict(reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PoolingError::ClaimConflict(format!("pool {} kept changing", pool_id))
        }))
    }

    /// Create an active pool from `group` and claim all of its requests in one
    /// commit. Fails with `ClaimConflict` if any member stopped waiting.
    pub async fn form(
        &self,
        group: &[RideRequest],
        cost: &CostBreakdown,
    ) -> Result<Pool, PoolingError> {
        let transition = transitions::form(group, cost, Utc::now())?;
        let pool = self.apply(transition).await?;
        info!(
            "Formed pool {} with {} members, {} per member",
            pool.id,
            pool.members.len(),
            pool.cost_per_user
        );
        Ok(pool)
    }

    /// Remove `user_id` from the pool, cancelling it if one rider or fewer remain
    pub async fn leave(&self, pool_id: &ObjectId, user_id: &str) -> Result<Pool, PoolingError> {
        let pool = self
            .update_pool(pool_id, |pool| {
                let pool = pool.ok_or_else(|| PoolingError::not_found("pool", pool_id))?;
                transitions::leave(&pool, user_id, Utc::now())
            })
            .await?;
        info!(
            "User {} left pool {}, now {} with {} members",
            user_id,
            pool_id,
            pool.status,
            pool.members.len()
        );
        Ok(pool)
    }

    /// Complete the pool and all of its requests. A missing pool is reported
    /// as `NotAMember`.
    pub async fn complete(&self, pool_id: &ObjectId, user_id: &str) -> Result<Pool, PoolingError> {
        let pool = self
            .update_pool(pool_id, |pool| {
                let pool = pool.ok_or_else(|| PoolingError::not_a_member(pool_id, user_id))?;
                transitions::complete(&pool, user_id, Utc::now())
            })
            .await?;
        info!("Pool {} completed by {}", pool_id, user_id);
        Ok(pool)
    }

    /// Status of a request owned by `user_id`, with its pool if it has one
    pub async fn get_status(
        &self,
        request_id: &ObjectId,
        user_id: &str,
    ) -> Result<RequestStatusView, PoolingError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| PoolingError::not_found("ride request", request_id))?;

        let pool = match request.pool_id {
            Some(pool_id) => self.pools.find_by_id(&pool_id).await?,
            None => None,
        };

        Ok(RequestStatusView { request, pool })
    }

    pub async fn find_pool(&self, pool_id: &ObjectId) -> Result<Option<Pool>, PoolingError> {
        Ok(self.pools.find_by_id(pool_id).await?)
    }

    /// Pool detail for one of its members; anyone else gets `NotFound`
    pub async fn pool_detail(
        &self,
        pool_id: &ObjectId,
        user_id: &str,
    ) -> Result<PoolDetail, PoolingError> {
        let pool = self
            .pools
            .find_by_id(pool_id)
            .await?
            .filter(|p| p.is_member(user_id))
            .ok_or_else(|| PoolingError::not_found("pool", pool_id))?;

        let mut requests = self.requests.find_by_ids(&pool.ride_requests).await?;
        requests.sort_by_key(|r| pool.ride_requests.iter().position(|id| *id == r.id));

        Ok(PoolDetail { pool, requests })
    }

    pub async fn active_pools(&self, user_id: &str) -> Result<Vec<Pool>, PoolingError> {
        Ok(self
            .pools
            .find_by_member(user_id, &[PoolStatus::Active])
            .await?)
    }

    pub async fn pool_history(&self, user_id: &str) -> Result<Vec<Pool>, PoolingError> {
        Ok(self
            .pools
            .find_by_member(user_id, &[PoolStatus::Completed, PoolStatus::Cancelled])
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::database::memory::MemoryStore;
    use crate::database::models::{Location, RequestStatus};
    use crate::database::testing::{CommitFault, FaultyPoolStore};
    use crate::matching::cost::allocate_cost;
    use crate::services::notification_handler::PoolEvent;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationPublisher for RecordingPublisher {
        async fn publish(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    struct Fixture {
        stores: Stores,
        publisher: Arc<RecordingPublisher>,
        manager: PoolLifecycleManager,
    }

    fn fixture() -> Fixture {
        let stores = Stores::memory();
        let publisher = Arc::new(RecordingPublisher::default());
        let manager =
            PoolLifecycleManager::new(&stores, publisher.clone(), LifecycleConfig::default());
        Fixture {
            stores,
            publisher,
            manager,
        }
    }

    async fn waiting(stores: &Stores, users: &[&str]) -> Vec<RideRequest> {
        let mut group = Vec::new();
        for (i, user) in users.iter().enumerate() {
            let offset = i as f64 * 0.0005;
            let request = RideRequest::new(
                user.to_string(),
                Location { lat: 12.97 + offset, lng: 77.59, address: None },
                Location { lat: 13.03, lng: 77.60 + offset, address: None },
                Utc::now(),
            );
            stores.requests.insert(&request).await.unwrap();
            group.push(request);
        }
        group
    }

    async fn form_pool(f: &Fixture, users: &[&str]) -> (Vec<RideRequest>, Pool) {
        let group = waiting(&f.stores, users).await;
        let cost = allocate_cost(&group, &PricingConfig::default());
        let pool = f.manager.form(&group, &cost).await.unwrap();
        (group, pool)
    }

    async fn status_of(f: &Fixture, request: &RideRequest) -> RideRequest {
        f.stores
            .requests
            .find_by_id(&request.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn form_matches_members_and_notifies_after_commit() {
        let f = fixture();
        let (group, pool) = form_pool(&f, &["a", "b", "c"]).await;

        for request in &group {
            let stored = status_of(&f, request).await;
            assert_eq!(stored.status, RequestStatus::Matched);
            assert_eq!(stored.pool_id, Some(pool.id));
        }
        let sent = f.publisher.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|n| n.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_form_publishes_nothing() {
        let f = fixture();
        let (group, _) = form_pool(&f, &["a", "b"]).await;
        f.publisher.sent.lock().unwrap().clear();

        // stale snapshot: both requests are already matched
        let cost = allocate_cost(&group, &PricingConfig::default());
        let err = f.manager.form(&group, &cost).await.unwrap_err();
        assert!(matches!(err, PoolingError::ClaimConflict(_)));
        assert!(f.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn leave_from_three_keeps_pool_active() {
        let f = fixture();
        let (group, pool) = form_pool(&f, &["a", "b", "c"]).await;

        let updated = f.manager.leave(&pool.id, "a").await.unwrap();
        assert_eq!(updated.status, PoolStatus::Active);
        assert_eq!(updated.members, vec!["b".to_string(), "c".to_string()]);

        let left = status_of(&f, &group[0]).await;
        assert_eq!(left.status, RequestStatus::Waiting);
        assert_eq!(left.pool_id, None);
        for request in &group[1..] {
            let stored = status_of(&f, request).await;
            assert_eq!(stored.status, RequestStatus::Matched);
            assert_eq!(stored.pool_id, Some(pool.id));
        }
    }

    #[tokio::test]
    async fn leave_from_pair_cascades() {
        let f = fixture();
        let (group, pool) = form_pool(&f, &["a", "b"]).await;

        let updated = f.manager.leave(&pool.id, "b").await.unwrap();
        assert_eq!(updated.status, PoolStatus::Cancelled);
        for request in &group {
            let stored = status_of(&f, request).await;
            assert_eq!(stored.status, RequestStatus::Waiting);
            assert_eq!(stored.pool_id, None);
        }
        assert!(f.manager.active_pools("a").await.unwrap().is_empty());
        assert_eq!(f.manager.pool_history("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leave_by_non_member_does_not_mutate() {
        let f = fixture();
        let (_, pool) = form_pool(&f, &["a", "b"]).await;

        let err = f.manager.leave(&pool.id, "mallory").await.unwrap_err();
        assert!(matches!(err, PoolingError::NotAMember { .. }));
        let stored = f.manager.find_pool(&pool.id).await.unwrap().unwrap();
        assert_eq!(stored, pool);

        let missing = f.manager.leave(&ObjectId::new(), "a").await.unwrap_err();
        assert!(matches!(missing, PoolingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn complete_by_member_completes_requests() {
        let f = fixture();
        let (group, pool) = form_pool(&f, &["a", "b"]).await;

        let done = f.manager.complete(&pool.id, "b").await.unwrap();
        assert_eq!(done.status, PoolStatus::Completed);
        for request in &group {
            let stored = status_of(&f, request).await;
            assert_eq!(stored.status, RequestStatus::Completed);
            assert_eq!(stored.pool_id, Some(pool.id));
        }

        let again = f.manager.complete(&pool.id, "a").await.unwrap_err();
        assert!(matches!(again, PoolingError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn complete_by_non_member_leaves_pool_unchanged() {
        let f = fixture();
        let (_, pool) = form_pool(&f, &["a", "b"]).await;

        let err = f.manager.complete(&pool.id, "mallory").await.unwrap_err();
        assert!(matches!(err, PoolingError::NotAMember { .. }));
        let stored = f.manager.find_pool(&pool.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PoolStatus::Active);

        let missing = f.manager.complete(&ObjectId::new(), "a").await.unwrap_err();
        assert!(matches!(missing, PoolingError::NotAMember { .. }));
    }

    #[tokio::test]
    async fn status_and_detail_are_scoped_to_the_owner() {
        let f = fixture();
        let (group, pool) = form_pool(&f, &["a", "b"]).await;

        let view = f.manager.get_status(&group[0].id, "a").await.unwrap();
        assert_eq!(view.request.status, RequestStatus::Matched);
        assert_eq!(view.pool.map(|p| p.id), Some(pool.id));

        let foreign = f.manager.get_status(&group[0].id, "b").await.unwrap_err();
        assert!(matches!(foreign, PoolingError::NotFound { .. }));

        let detail = f.manager.pool_detail(&pool.id, "b").await.unwrap();
        let ids: Vec<ObjectId> = detail.requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, pool.ride_requests);
        assert!(f.manager.pool_detail(&pool.id, "zed").await.is_err());
    }

    struct Faulty {
        healthy: Fixture,
        publisher: Arc<RecordingPublisher>,
        manager: PoolLifecycleManager,
    }

    /// A healthy fixture plus a manager over the same data whose commits fail
    fn faulty(fault: CommitFault) -> Faulty {
        let memory = MemoryStore::new();
        let stores = Stores {
            requests: Arc::new(memory.clone()),
            pools: Arc::new(memory.clone()),
        };
        let healthy_publisher = Arc::new(RecordingPublisher::default());
        let healthy = Fixture {
            manager: PoolLifecycleManager::new(
                &stores,
                healthy_publisher.clone(),
                LifecycleConfig::default(),
            ),
            stores: stores.clone(),
            publisher: healthy_publisher,
        };

        let broken = Stores {
            requests: stores.requests.clone(),
            pools: Arc::new(FaultyPoolStore {
                inner: memory,
                fault,
            }),
        };
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = PoolLifecycleManager::new(
            &broken,
            publisher.clone(),
            LifecycleConfig {
                commit_timeout_ms: 50,
                commit_attempts: 3,
            },
        );
        Faulty {
            healthy,
            publisher,
            manager,
        }
    }

    async fn assert_failed_commits_change_nothing(fault: CommitFault) {
        let f = faulty(fault);
        let expected = |err: &PoolingError| match fault {
            CommitFault::Hang => matches!(err, PoolingError::Timeout(_)),
            _ => matches!(err, PoolingError::StoreUnavailable(_)),
        };

        let (group, pool) = form_pool(&f.healthy, &["a", "b"]).await;

        let fresh = waiting(&f.healthy.stores, &["c", "d"]).await;
        let cost = allocate_cost(&fresh, &PricingConfig::default());
        let err = f.manager.form(&fresh, &cost).await.unwrap_err();
        assert!(expected(&err), "form: {:?}", err);
        assert!(err.is_retryable());
        for request in &fresh {
            let stored = status_of(&f.healthy, request).await;
            assert_eq!(stored.status, RequestStatus::Waiting);
            assert_eq!(stored.pool_id, None);
        }
        assert!(f.manager.active_pools("c").await.unwrap().is_empty());

        let err = f.manager.leave(&pool.id, "a").await.unwrap_err();
        assert!(expected(&err), "leave: {:?}", err);
        let err = f.manager.complete(&pool.id, "b").await.unwrap_err();
        assert!(expected(&err), "complete: {:?}", err);

        assert_eq!(f.manager.find_pool(&pool.id).await.unwrap(), Some(pool.clone()));
        for request in &group {
            let stored = status_of(&f.healthy, request).await;
            assert_eq!(stored.status, RequestStatus::Matched);
            assert_eq!(stored.pool_id, Some(pool.id));
        }
        assert!(f.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_outage_changes_nothing_and_publishes_nothing() {
        assert_failed_commits_change_nothing(CommitFault::Unavailable).await;
    }

    #[tokio::test]
    async fn commit_timeout_changes_nothing_and_publishes_nothing() {
        assert_failed_commits_change_nothing(CommitFault::Hang).await;
    }

    #[tokio::test]
    async fn commit_that_lands_after_timeout_is_reported_applied() {
        let f = faulty(CommitFault::SlowAck);
        let (group, pool) = form_pool(&f.healthy, &["a", "b", "c"]).await;

        let updated = f.manager.leave(&pool.id, "a").await.unwrap();
        assert_eq!(updated.members, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(f.manager.find_pool(&pool.id).await.unwrap(), Some(updated));
        assert_eq!(
            status_of(&f.healthy, &group[0]).await.status,
            RequestStatus::Waiting
        );

        let sent = f.publisher.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|n| n.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["b", "c"]);
        assert!(sent
            .iter()
            .all(|n| matches!(n.event, PoolEvent::MemberLeft { .. })));
    }
}
