pub mod manager;
pub mod transitions;

pub use manager::{PoolDetail, PoolLifecycleManager, RequestStatusView};
pub use transitions::Transition;
