pub mod memory;
pub mod models;
pub mod mongodb;
pub mod repositories;
pub mod service;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use memory::MemoryStore;
pub use self::mongodb::MongoDbClient;
pub use service::{MongoDbService, Stores};
pub use store::{
    PoolChange, PoolStore, PoolWrite, RequestClaim, RideRequestStore, StoreError, StoreResult,
};
