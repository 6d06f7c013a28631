use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use log::warn;
use std::sync::Arc;

use crate::{config::Config, errors::ApiError};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Identity of the caller, established by the upstream gateway.
///
/// When `server.api_key` is configured the request must also carry a matching
/// `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct Requester(pub String);

impl Requester {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl FromRequest for Requester {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<Requester, ApiError> {
    let config = match req.app_data::<web::Data<Arc<Config>>>() {
        Some(config) => config,
        None => {
            warn!("Config not found in app data");
            return Err(ApiError::InternalError);
        }
    };

    if let Some(configured_key) = &config.server.api_key {
        match header(req, API_KEY_HEADER) {
            Some(key) if &key == configured_key => {}
            Some(_) => {
                warn!("Invalid API key provided");
                return Err(ApiError::Unauthorized("Invalid API key".into()));
            }
            None => {
                warn!("API key required but not provided");
                return Err(ApiError::Unauthorized("API key required".into()));
            }
        }
    }

    header(req, USER_ID_HEADER)
        .map(Requester)
        .ok_or_else(|| ApiError::Unauthorized(format!("{} header required", USER_ID_HEADER)))
}
