use actix_web::web;

use crate::handlers::notification::pool_events_handler;

pub fn configure_notification_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/notifications", web::get().to(pool_events_handler));
}
