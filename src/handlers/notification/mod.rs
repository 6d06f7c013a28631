pub mod notification;

pub use notification::{event_stream, pool_events_handler, sse_frame};
