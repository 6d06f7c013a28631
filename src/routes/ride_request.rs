use actix_web::web;

use crate::handlers::ride_request::{
    get_ride_request_status_handler, list_ride_requests_handler, submit_ride_request_handler,
    withdraw_ride_request_handler,
};

pub fn configure_ride_request_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ride-requests", web::post().to(submit_ride_request_handler))
        .route("/ride-requests", web::get().to(list_ride_requests_handler))
        .route(
            "/ride-requests/{id}",
            web::delete().to(withdraw_ride_request_handler),
        )
        .route(
            "/ride-requests/{id}/status",
            web::get().to(get_ride_request_status_handler),
        );
}
