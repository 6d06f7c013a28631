//! Pure matching algorithms: distance, candidate filtering, grouping and
//! cost allocation. Nothing here touches a store.

pub mod cost;
pub mod filter;
pub mod geo;
pub mod grouping;

pub use cost::{allocate_cost, CostBreakdown};
pub use filter::{filter_candidates, Candidate};
pub use geo::{distance_km, GeoPoint};
pub use grouping::select_group;
