use actix_web::web;

use crate::handlers::pool::{
    complete_pool_handler, get_active_pools_handler, get_pool_handler, get_pool_history_handler,
    leave_pool_handler,
};

pub fn configure_pool_routes(cfg: &mut web::ServiceConfig) {
    // /pools/history must be registered ahead of /pools/{id}
    cfg.route("/pools", web::get().to(get_active_pools_handler))
        .route("/pools/history", web::get().to(get_pool_history_handler))
        .route("/pools/{id}", web::get().to(get_pool_handler))
        .route("/pools/{id}/leave", web::delete().to(leave_pool_handler))
        .route("/pools/{id}/complete", web::patch().to(complete_pool_handler));
}
