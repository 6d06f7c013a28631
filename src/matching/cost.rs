//! Per-member cost estimate for a formed group.

use crate::config::PricingConfig;
use crate::database::models::RideRequest;
use crate::matching::geo::distance_km;

#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub group_size: usize,
    pub avg_trip_distance_km: f64,
    pub base_cost: f64,
    pub cost_per_member: i64,
    /// Display figure only: estimated saving versus riding alone
    pub savings: i64,
}

impl CostBreakdown {
    pub fn savings_message(&self) -> String {
        let others = self.group_size.saturating_sub(1);
        let riders = if others == 1 { "rider" } else { "riders" };
        format!(
            "You pay {} by sharing with {} other {}, saving about {} compared to riding alone",
            self.cost_per_member, others, riders, self.savings
        )
    }
}

/// Split the estimated trip cost evenly across `group`.
///
/// Trip distance is the mean straight-line source to destination distance of
/// the members. `group` must hold at least one request.
pub fn allocate_cost(group: &[RideRequest], pricing: &PricingConfig) -> CostBreakdown {
    let group_size = group.len().max(1);
    let n = group_size as f64;

    let avg_trip_distance_km = group
        .iter()
        .map(|r| distance_km(r.source.point(), r.destination.point()))
        .sum::<f64>()
        / n;
    let base_cost = avg_trip_distance_km * pricing.rate_per_km;
    let cost_per_member = (base_cost / n).round();
    let savings = (base_cost * pricing.solo_multiplier / n - cost_per_member).round();

    CostBreakdown {
        group_size,
        avg_trip_distance_km,
        base_cost,
        cost_per_member: cost_per_member as i64,
        savings: savings as i64,
    }
}
