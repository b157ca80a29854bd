//! Wire framing for the event stream.

use std::sync::Arc;

use axum::body::Bytes;

/// Event name used when a trigger does not name one
pub const DEFAULT_EVENT: &str = "update";

/// Event sent once, before anything else, after a connection is registered
pub const CONNECTED_EVENT: &str = "connected";

const KEEP_ALIVE_FRAME: &str = ":keep-alive\n\n";

/// One unit written to a streaming connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `data: connected`
    Connected,
    /// `data: <name>`
    Event(Arc<str>),
    /// `:keep-alive` comment line, ignored by clients
    KeepAlive,
}

impl SseFrame {
    /// Build an event frame, falling back to [`DEFAULT_EVENT`] when no name is given
    pub fn event(name: Option<&str>) -> Self {
        Self::Event(Arc::from(name.unwrap_or(DEFAULT_EVENT)))
    }

    /// Name carried by this frame, if it is a data event
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Connected => Some(CONNECTED_EVENT),
            Self::Event(name) => Some(name),
            Self::KeepAlive => None,
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        matches!(self, Self::KeepAlive)
    }

    /// Encode to the text/event-stream wire format.
    ///
    /// Names spanning several lines become one `data:` field per line so a
    /// stray newline can never terminate the event early.
    pub fn encode(&self) -> String {
        match self {
            Self::KeepAlive => KEEP_ALIVE_FRAME.to_string(),
            Self::Connected => encode_data(CONNECTED_EVENT),
            Self::Event(name) => encode_data(name),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}

fn encode_data(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 8);
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push('\n');
    }
    out.push('\n');
    out
}
