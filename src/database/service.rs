use anyhow::Result;
use log::info;
use std::sync::Arc;

use super::memory::MemoryStore;
use super::mongodb::MongoDbClient;
use super::repositories::{PoolRepository, RideRequestRepository};
use super::store::{PoolStore, RideRequestStore};
use crate::config::{MongoDbConfig, StorageBackend};

/// MongoDB service owning the client and the repositories built on it
#[derive(Debug, Clone)]
pub struct MongoDbService {
    _client: Arc<MongoDbClient>,
    ride_request_repo: RideRequestRepository,
    pool_repo: PoolRepository,
}

impl MongoDbService {
    /// Create a new MongoDB service
    pub async fn new(config: &MongoDbConfig) -> Result<Self> {
        config.validate()?;
        let client = MongoDbClient::init(config).await?;

        let ride_request_repo = RideRequestRepository::new(client.clone());
        let pool_repo = PoolRepository::new(client.clone());

        Ok(Self {
            _client: client,
            ride_request_repo,
            pool_repo,
        })
    }

    /// Get ride request repository
    pub fn get_ride_request_repo(&self) -> &RideRequestRepository {
        &self.ride_request_repo
    }

    /// Get pool repository
    pub fn get_pool_repo(&self) -> &PoolRepository {
        &self.pool_repo
    }
}

/// The pair of stores injected into the matching engine and lifecycle manager
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RideRequestStore>,
    pub pools: Arc<dyn PoolStore>,
}

impl Stores {
    /// Both stores backed by one in-memory instance
    pub fn memory() -> Self {
        let store = MemoryStore::new();
        Self {
            requests: Arc::new(store.clone()),
            pools: Arc::new(store),
        }
    }

    pub fn mongodb(service: &MongoDbService) -> Self {
        Self {
            requests: Arc::new(service.get_ride_request_repo().clone()),
            pools: Arc::new(service.get_pool_repo().clone()),
        }
    }

    /// Build the stores selected by `config.backend`
    pub async fn from_config(config: &MongoDbConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage backend");
                Ok(Self::memory())
            }
            StorageBackend::MongoDb => {
                let service = MongoDbService::new(config).await?;
                Ok(Self::mongodb(&service))
            }
        }
    }
}
