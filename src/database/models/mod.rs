pub mod pool;
pub mod ride_request;

pub use pool::{Pool, PoolStatus};
pub use ride_request::{Location, RequestStatus, RideRequest};
