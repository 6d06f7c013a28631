pub mod notification;
pub mod pool;
pub mod ride_request;
pub mod routes;

pub use routes::*;
