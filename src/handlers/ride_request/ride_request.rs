use actix_web::{web, HttpResponse};
use log::{error, info};

use crate::{
    errors::ApiError,
    handlers::{
        auth::Requester,
        parse_object_id,
        ride_request::dto::{RideRequestResponse, RideRequestWithPool, SubmitRideRequest},
    },
    services::{MatchingEngine, NewRideRequest, PoolLifecycleManager},
};

/// POST /ride-requests - Submits a ride request and attempts to pool it
///
/// # Returns
/// 201 with the stored request and, when a pool formed, the pool
pub async fn submit_ride_request_handler(
    requester: Requester,
    engine: web::Data<MatchingEngine>,
    body: web::Json<SubmitRideRequest>,
) -> Result<HttpResponse, ApiError> {
    info!("Handling POST /ride-requests request from {}", requester.id());
    let body = body.into_inner();

    let new_request = NewRideRequest {
        user_id: requester.0,
        source: body.source,
        destination: body.destination,
        time: body.time,
    };

    match engine.submit(new_request).await {
        Ok(submission) => {
            match &submission.pool {
                Some(pool) => info!(
                    "Ride request {} matched into pool {}",
                    submission.request.id, pool.id
                ),
                None => info!("Ride request {} is waiting", submission.request.id),
            }
            Ok(HttpResponse::Created().json(RideRequestWithPool::from(submission)))
        }
        Err(e) => {
            error!("Failed to submit ride request: {}", e);
            Err(e.into())
        }
    }
}

/// GET /ride-requests - Returns the requester's ride requests, newest first
pub async fn list_ride_requests_handler(
    requester: Requester,
    engine: web::Data<MatchingEngine>,
) -> Result<HttpResponse, ApiError> {
    info!("Handling GET /ride-requests request from {}", requester.id());

    match engine.list_requests(requester.id()).await {
        Ok(requests) => {
            info!("Successfully retrieved {} ride requests", requests.len());
            let body: Vec<RideRequestResponse> = requests.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Err(e) => {
            error!("Failed to retrieve ride requests: {}", e);
            Err(e.into())
        }
    }
}

/// GET /ride-requests/{id}/status - Returns a request and its pool, if matched
pub async fn get_ride_request_status_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id_str = path.into_inner();
    info!("Handling GET /ride-requests/{}/status request", id_str);
    let id = parse_object_id(&id_str)?;

    match lifecycle.get_status(&id, requester.id()).await {
        Ok(view) => Ok(HttpResponse::Ok().json(RideRequestWithPool::from(view))),
        Err(e) => {
            error!("Failed to retrieve status of ride request {}: {}", id_str, e);
            Err(e.into())
        }
    }
}

/// DELETE /ride-requests/{id} - Withdraws a request that is still waiting
pub async fn withdraw_ride_request_handler(
    requester: Requester,
    engine: web::Data<MatchingEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id_str = path.into_inner();
    info!("Handling DELETE /ride-requests/{} request", id_str);
    let id = parse_object_id(&id_str)?;

    match engine.withdraw(&id, requester.id()).await {
        Ok(request) => {
            info!("Successfully withdrew ride request {}", id_str);
            Ok(HttpResponse::Ok().json(RideRequestResponse::from(request)))
        }
        Err(e) => {
            error!("Failed to withdraw ride request {}: {}", id_str, e);
            Err(e.into())
        }
    }
}
