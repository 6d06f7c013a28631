pub mod dto;
pub mod pool;

pub use dto::*;
pub use pool::{
    complete_pool_handler, get_active_pools_handler, get_pool_handler,
    get_pool_history_handler, leave_pool_handler,
};
