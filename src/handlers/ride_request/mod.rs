pub mod dto;
pub mod ride_request;

pub use dto::*;
pub use ride_request::{
    get_ride_request_status_handler, list_ride_requests_handler, submit_ride_request_handler,
    withdraw_ride_request_handler,
};
