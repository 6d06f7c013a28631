//! Selects waiting requests that can share a trip with a new request.

use chrono::Duration;

use crate::config::MatchingConfig;
use crate::database::models::{RequestStatus, RideRequest};
use crate::matching::geo::distance_km;

/// A waiting request that satisfied every constraint, with its pickup
/// distance to the new request.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub request: &'a RideRequest,
    pub pickup_km: f64,
}

/// Keep the waiting requests within the time window, pickup radius and
/// destination radius of `new_request`. Input order is preserved.
///
/// The new request itself, non-waiting requests and requests from the same
/// requester are never candidates.
pub fn filter_candidates<'a>(
    new_request: &RideRequest,
    waiting: &'a [RideRequest],
    config: &MatchingConfig,
) -> Vec<Candidate<'a>> {
    let window = Duration::minutes(config.time_window_minutes);

    waiting
        .iter()
        .filter(|c| c.id != new_request.id)
        .filter(|c| c.status == RequestStatus::Waiting)
        .filter(|c| c.user_id != new_request.user_id)
        .filter(|c| {
            let gap = c.time - new_request.time;
            -window <= gap && gap <= window
        })
        .filter_map(|c| {
            let pickup_km = distance_km(new_request.source.point(), c.source.point());
            if pickup_km > config.pickup_radius_km {
                return None;
            }
            let dropoff_km = distance_km(new_request.destination.point(), c.destination.point());
            if dropoff_km > config.destination_radius_km {
                return None;
            }
            Some(Candidate {
                request: c,
                pickup_km,
            })
        })
        .collect()
}
