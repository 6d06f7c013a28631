pub mod lifecycle;
pub mod matching_engine;
pub mod notification_handler;

pub use lifecycle::{PoolDetail, PoolLifecycleManager, RequestStatusView};
pub use matching_engine::{MatchingEngine, NewRideRequest, Submission};
pub use notification_handler::{
    ChannelPublisher, LogPublisher, Notification, NotificationPublisher, PoolEvent,
};
