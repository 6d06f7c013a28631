use actix_web::{web, HttpResponse};
use log::{error, info};

use crate::{
    errors::ApiError,
    handlers::{
        auth::Requester,
        parse_object_id,
        pool::dto::{PoolDetailResponse, PoolResponse},
    },
    services::PoolLifecycleManager,
};

fn to_responses(pools: Vec<crate::database::models::Pool>) -> Vec<PoolResponse> {
    pools.into_iter().map(Into::into).collect()
}

/// GET /pools - Returns the requester's active pools
pub async fn get_active_pools_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
) -> Result<HttpResponse, ApiError> {
    info!("Handling GET /pools request from {}", requester.id());

    match lifecycle.active_pools(requester.id()).await {
        Ok(pools) => {
            info!("Successfully retrieved {} pools", pools.len());
            Ok(HttpResponse::Ok().json(to_responses(pools)))
        }
        Err(e) => {
            error!("Failed to retrieve pools: {}", e);
            Err(e.into())
        }
    }
}

/// GET /pools/history - Returns the requester's completed and cancelled pools
pub async fn get_pool_history_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
) -> Result<HttpResponse, ApiError> {
    info!("Handling GET /pools/history request from {}", requester.id());

    match lifecycle.pool_history(requester.id()).await {
        Ok(pools) => {
            info!("Successfully retrieved {} past pools", pools.len());
            Ok(HttpResponse::Ok().json(to_responses(pools)))
        }
        Err(e) => {
            error!("Failed to retrieve pool history: {}", e);
            Err(e.into())
        }
    }
}

/// GET /pools/{id} - Returns pool detail for a member
pub async fn get_pool_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id_str = path.into_inner();
    info!("Handling GET /pools/{} request", id_str);
    let id = parse_object_id(&id_str)?;

    match lifecycle.pool_detail(&id, requester.id()).await {
        Ok(detail) => Ok(HttpResponse::Ok().json(PoolDetailResponse::from(detail))),
        Err(e) => {
            error!("Failed to retrieve pool {}: {}", id_str, e);
            Err(e.into())
        }
    }
}

/// DELETE /pools/{id}/leave - Removes the requester from an active pool
///
/// # Returns
/// The pool after the change; cancelled when at most one member remained
pub async fn leave_pool_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id_str = path.into_inner();
    info!(
        "Handling DELETE /pools/{}/leave request from {}",
        id_str,
        requester.id()
    );
    let id = parse_object_id(&id_str)?;

    match lifecycle.leave(&id, requester.id()).await {
        Ok(pool) => {
            info!("{} left pool {} (now {})", requester.id(), id_str, pool.status);
            Ok(HttpResponse::Ok().json(PoolResponse::from(pool)))
        }
        Err(e) => {
            error!("Failed to leave pool {}: {}", id_str, e);
            Err(e.into())
        }
    }
}

/// PATCH /pools/{id}/complete - Marks an active pool as completed
pub async fn complete_pool_handler(
    requester: Requester,
    lifecycle: web::Data<PoolLifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id_str = path.into_inner();
    info!(
        "Handling PATCH /pools/{}/complete request from {}",
        id_str,
        requester.id()
    );
    let id = parse_object_id(&id_str)?;

    match lifecycle.complete(&id, requester.id()).await {
        Ok(pool) => {
            info!("Successfully completed pool {}", id_str);
            Ok(HttpResponse::Ok().json(PoolResponse::from(pool)))
        }
        Err(e) => {
            error!("Failed to complete pool {}: {}", id_str, e);
            Err(e.into())
        }
    }
}
