pub mod pool;
pub mod ride_request;

pub use pool::PoolRepository;
pub use ride_request::RideRequestRepository;
