mod http;

pub use http::{
    broadcast_event, notify_identity, BroadcastRequest, BroadcastResponse, NotifyRequest,
    NotifyResponse,
};
