//! Greedy nearest-pickup grouping.

use crate::database::models::RideRequest;
use crate::matching::filter::Candidate;

/// Build a group of `new_request` plus its nearest candidates, at most
/// `max_group_size` riders. Returns `None` when no other rider is available,
/// which means the new request keeps waiting.
///
/// Candidates with equal pickup distance keep their input (submission) order.
pub fn select_group(
    new_request: &RideRequest,
    mut candidates: Vec<Candidate<'_>>,
    max_group_size: usize,
) -> Option<Vec<RideRequest>> {
    candidates.sort_by(|a, b| a.pickup_km.total_cmp(&b.pickup_km));

    let group: Vec<RideRequest> = std::iter::once(new_request.clone())
        .chain(candidates.into_iter().map(|c| c.request.clone()))
        .take(max_group_size)
        .collect();

    if group.len() < 2 {
        return None;
    }
    Some(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Location;
    use chrono::Utc;

    fn request(user: &str) -> RideRequest {
        let here = Location {
            lat: 0.0,
            lng: 0.0,
            address: None,
        };
        RideRequest::new(user.to_string(), here.clone(), here, Utc::now())
    }

    fn users(group: &[RideRequest]) -> Vec<&str> {
        group.iter().map(|r| r.user_id.as_str()).collect()
    }

    #[test]
    fn no_candidates_keeps_waiting() {
        let seed = request("seed");
        assert!(select_group(&seed, Vec::new(), 4).is_none());
    }

    #[test]
    fn nearest_pickup_first_and_truncated() {
        let seed = request("seed");
        let pool = vec![request("far"), request("near"), request("mid"), request("mid2")];
        let candidates = vec![
            Candidate { request: &pool[0], pickup_km: 1.9 },
            Candidate { request: &pool[1], pickup_km: 0.1 },
            Candidate { request: &pool[2], pickup_km: 0.8 },
            Candidate { request: &pool[3], pickup_km: 0.8 },
        ];
        let group = select_group(&seed, candidates, 4).unwrap();
        assert_eq!(users(&group), vec!["seed", "near", "mid", "mid2"]);
    }

    #[test]
    fn respects_smaller_max_size() {
        let seed = request("seed");
        let pool = vec![request("a"), request("b")];
        let candidates = vec![
            Candidate { request: &pool[0], pickup_km: 0.5 },
            Candidate { request: &pool[1], pickup_km: 0.2 },
        ];
        let group = select_group(&seed, candidates, 2).unwrap();
        assert_eq!(users(&group), vec!["seed", "b"]);
    }
}
