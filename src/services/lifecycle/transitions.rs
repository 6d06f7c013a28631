//! Side-effect free pool state machine.
//!
//! Each function takes the current state and returns the [`PoolChange`] to
//! commit plus the notifications to publish once it is committed. Nothing is
//! written here.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};

use crate::database::models::{Pool, PoolStatus, RequestStatus, RideRequest};
use crate::database::store::{PoolChange, PoolWrite, RequestClaim};
use crate::errors::PoolingError;
use crate::matching::cost::CostBreakdown;
use crate::matching::geo::centroid;
use crate::services::notification_handler::{Notification, PoolEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub change: PoolChange,
    pub notifications: Vec<Notification>,
}

fn notify_all(members: &[String], event: PoolEvent) -> Vec<Notification> {
    members
        .iter()
        .map(|m| Notification {
            recipient: m.clone(),
            event: event.clone(),
        })
        .collect()
}

fn release(request_id: ObjectId, pool_id: ObjectId) -> RequestClaim {
    RequestClaim {
        request_id,
        expect_status: RequestStatus::Matched,
        expect_pool: Some(pool_id),
        status: RequestStatus::Waiting,
        pool_id: None,
    }
}

fn ensure_active(pool: &Pool) -> Result<(), PoolingError> {
    if pool.status.is_terminal() {
        return Err(PoolingError::InvalidTransition(format!(
            "pool {} is already {}",
            pool.id, pool.status
        )));
    }
    Ok(())
}

/// Create an active pool from `group` and claim every member request.
///
/// The pickup zone is the mean of the member pickups and the departure time is
/// the earliest requested time.
pub fn form(
    group: &[RideRequest],
    cost: &CostBreakdown,
    now: DateTime<Utc>,
) -> Result<Transition, PoolingError> {
    if group.len() < 2 {
        return Err(PoolingError::Validation(format!(
            "a pool needs at least two riders, got {}",
            group.len()
        )));
    }
    if let Some(taken) = group.iter().find(|r| r.status != RequestStatus::Waiting) {
        return Err(PoolingError::ClaimConflict(format!(
            "ride request {} is {}",
            taken.id, taken.status
        )));
    }

    let sources: Vec<_> = group.iter().map(|r| r.source.point()).collect();
    let pickup_zone = centroid(&sources).ok_or_else(|| {
        PoolingError::Validation("cannot derive a pickup zone from an empty group".into())
    })?;
    let departure_time = group.iter().map(|r| r.time).min().unwrap_or(now);
    let timestamp = now.timestamp() as u64;

    let pool = Pool {
        id: ObjectId::new(),
        members: group.iter().map(|r| r.user_id.clone()).collect(),
        ride_requests: group.iter().map(|r| r.id).collect(),
        pickup_zone,
        departure_time,
        cost_per_user: cost.cost_per_member,
        status: PoolStatus::Active,
        version: 0,
        created_at: timestamp,
        updated_at: timestamp,
    };

    let claims = group
        .iter()
        .map(|r| RequestClaim {
            request_id: r.id,
            expect_status: RequestStatus::Waiting,
            expect_pool: None,
            status: RequestStatus::Matched,
            pool_id: Some(pool.id),
        })
        .collect();

    let notifications = notify_all(
        &pool.members,
        PoolEvent::PoolFormed {
            pool_id: pool.id.to_hex(),
            members: pool.members.clone(),
            pickup_zone,
            departure_time,
            cost_per_member: cost.cost_per_member,
            savings_message: cost.savings_message(),
        },
    );

    Ok(Transition {
        change: PoolChange {
            pool,
            write: PoolWrite::Create,
            claims,
        },
        notifications,
    })
}

/// Remove `user_id` from `pool`. A pool left with one rider or fewer is
/// cancelled and every remaining request goes back to waiting.
pub fn leave(pool: &Pool, user_id: &str, now: DateTime<Utc>) -> Result<Transition, PoolingError> {
    let index = pool
        .members
        .iter()
        .position(|m| m == user_id)
        .ok_or_else(|| PoolingError::not_a_member(pool.id, user_id))?;
    ensure_active(pool)?;

    let mut next = pool.clone();
    next.members.remove(index);
    let leaving_request = next.ride_requests.remove(index);
    next.version = pool.version + 1;
    next.updated_at = now.timestamp() as u64;

    let mut claims = vec![release(leaving_request, pool.id)];
    let notifications = if next.members.len() <= 1 {
        next.status = PoolStatus::Cancelled;
        claims.extend(next.ride_requests.iter().map(|id| release(*id, pool.id)));
        notify_all(
            &next.members,
            PoolEvent::PoolCancelled {
                pool_id: pool.id.to_hex(),
            },
        )
    } else {
        notify_all(
            &next.members,
            PoolEvent::MemberLeft {
                pool_id: pool.id.to_hex(),
                user_id: user_id.to_string(),
                remaining_members: next.members.clone(),
            },
        )
    };

    Ok(Transition {
        change: PoolChange {
            write: PoolWrite::Update {
                expected_version: pool.version,
            },
            pool: next,
            claims,
        },
        notifications,
    })
}

/// Mark `pool` completed on behalf of member `user_id`. Every member request
/// is completed and keeps its pool reference.
pub fn complete(
    pool: &Pool,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Transition, PoolingError> {
    if !pool.is_member(user_id) {
        return Err(PoolingError::not_a_member(pool.id, user_id));
    }
    ensure_active(pool)?;

    let mut next = pool.clone();
    next.status = PoolStatus::Completed;
    next.version = pool.version + 1;
    next.updated_at = now.timestamp() as u64;

    let claims = pool
        .ride_requests
        .iter()
        .map(|id| RequestClaim {
            request_id: *id,
            expect_status: RequestStatus::Matched,
            expect_pool: Some(pool.id),
            status: RequestStatus::Completed,
            pool_id: Some(pool.id),
        })
        .collect();

    let notifications = notify_all(
        &pool.members,
        PoolEvent::PoolCompleted {
            pool_id: pool.id.to_hex(),
        },
    );

    Ok(Transition {
        change: PoolChange {
            pool: next,
            write: PoolWrite::Update {
                expected_version: pool.version,
            },
            claims,
        },
        notifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::database::models::Location;
    use crate::matching::cost::allocate_cost;
    use crate::matching::geo::GeoPoint;
    use chrono::{Duration, TimeZone};

    fn request(user: &str, lat: f64, minute: i64) -> RideRequest {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        RideRequest::new(
            user.to_string(),
            Location { lat, lng: 77.0, address: None },
            Location { lat: lat + 0.05, lng: 77.0, address: None },
            base + Duration::minutes(minute),
        )
    }

    fn formed(users: &[&str]) -> (Vec<RideRequest>, Pool) {
        let group: Vec<RideRequest> = users
            .iter()
            .enumerate()
            .map(|(i, u)| request(u, 12.0 + i as f64 * 0.001, i as i64))
            .collect();
        let cost = allocate_cost(&group, &PricingConfig::default());
        let transition = form(&group, &cost, Utc::now()).unwrap();
        (group, transition.change.pool)
    }

    #[test]
    fn form_derives_pickup_zone_and_departure() {
        let group = vec![request("a", 12.0, 10), request("b", 12.002, 4)];
        let cost = allocate_cost(&group, &PricingConfig::default());
        let transition = form(&group, &cost, Utc::now()).unwrap();
        let pool = &transition.change.pool;

        assert_eq!(pool.status, PoolStatus::Active);
        assert_eq!(pool.members, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pool.ride_requests, vec![group[0].id, group[1].id]);
        assert!((pool.pickup_zone.lat - 12.001).abs() < 1e-9);
        assert_eq!(pool.pickup_zone.lng, 77.0);
        assert_eq!(pool.departure_time, group[1].time);
        assert_eq!(pool.cost_per_user, cost.cost_per_member);
        assert_eq!(transition.change.write, PoolWrite::Create);

        assert_eq!(transition.change.claims.len(), 2);
        for claim in &transition.change.claims {
            assert_eq!(claim.expect_status, RequestStatus::Waiting);
            assert_eq!(claim.status, RequestStatus::Matched);
            assert_eq!(claim.pool_id, Some(pool.id));
        }
        assert_eq!(transition.notifications.len(), 2);
    }

    #[test]
    fn form_rejects_single_rider_and_taken_requests() {
        let solo = vec![request("a", 12.0, 0)];
        let cost = allocate_cost(&solo, &PricingConfig::default());
        assert!(matches!(
            form(&solo, &cost, Utc::now()),
            Err(PoolingError::Validation(_))
        ));

        let mut group = vec![request("a", 12.0, 0), request("b", 12.0, 0)];
        group[1].status = RequestStatus::Matched;
        assert!(matches!(
            form(&group, &cost, Utc::now()),
            Err(PoolingError::ClaimConflict(_))
        ));
    }

    #[test]
    fn leave_by_non_member_fails() {
        let (_, pool) = formed(&["a", "b", "c"]);
        let err = leave(&pool, "mallory", Utc::now()).unwrap_err();
        assert!(matches!(err, PoolingError::NotAMember { .. }));
    }

    #[test]
    fn leave_keeps_larger_pool_active() {
        let (group, pool) = formed(&["a", "b", "c"]);
        let transition = leave(&pool, "b", Utc::now()).unwrap();
        let next = &transition.change.pool;

        assert_eq!(next.status, PoolStatus::Active);
        assert_eq!(next.members, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(next.ride_requests, vec![group[0].id, group[2].id]);
        assert_eq!(next.members.len(), next.ride_requests.len());
        assert_eq!(next.version, pool.version + 1);
        assert_eq!(
            transition.change.write,
            PoolWrite::Update {
                expected_version: pool.version
            }
        );
        assert_eq!(transition.change.claims, vec![release(group[1].id, pool.id)]);
        assert!(transition
            .notifications
            .iter()
            .all(|n| matches!(n.event, PoolEvent::MemberLeft { .. })));
    }

    #[test]
    fn leave_from_pair_cancels_and_releases_both() {
        let (group, pool) = formed(&["a", "b"]);
        let transition = leave(&pool, "a", Utc::now()).unwrap();

        assert_eq!(transition.change.pool.status, PoolStatus::Cancelled);
        assert_eq!(
            transition.change.claims,
            vec![release(group[0].id, pool.id), release(group[1].id, pool.id)]
        );
        assert_eq!(transition.notifications.len(), 1);
        assert_eq!(transition.notifications[0].recipient, "b");
        assert!(matches!(
            transition.notifications[0].event,
            PoolEvent::PoolCancelled { .. }
        ));
    }

    #[test]
    fn complete_marks_every_request_completed() {
        let (group, pool) = formed(&["a", "b", "c"]);
        let transition = complete(&pool, "c", Utc::now()).unwrap();

        assert_eq!(transition.change.pool.status, PoolStatus::Completed);
        assert_eq!(transition.change.claims.len(), 3);
        for (claim, request) in transition.change.claims.iter().zip(&group) {
            assert_eq!(claim.request_id, request.id);
            assert_eq!(claim.status, RequestStatus::Completed);
            assert_eq!(claim.pool_id, Some(pool.id));
        }
    }

    #[test]
    fn terminal_pools_reject_transitions() {
        let (_, pool) = formed(&["a", "b"]);
        let done = complete(&pool, "a", Utc::now()).unwrap().change.pool;

        assert!(matches!(
            complete(&done, "a", Utc::now()),
            Err(PoolingError::InvalidTransition(_))
        ));
        assert!(matches!(
            leave(&done, "b", Utc::now()),
            Err(PoolingError::InvalidTransition(_))
        ));
        // membership is checked before the state
        assert!(matches!(
            complete(&done, "zed", Utc::now()),
            Err(PoolingError::NotAMember { .. })
        ));
    }

    #[test]
    fn request_lookup_follows_member_order() {
        let (group, pool) = formed(&["a", "b"]);
        assert_eq!(pool.request_of("b"), Some(group[1].id));
        assert_eq!(pool.request_of("x"), None);
        let expected = GeoPoint::new(12.0005, 77.0);
        assert!((pool.pickup_zone.lat - expected.lat).abs() < 1e-9);
        assert_eq!(pool.pickup_zone.lng, expected.lng);
    }
}
