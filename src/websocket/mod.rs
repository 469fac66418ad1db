//! WebSocket module for the Q&A board
//!
//! Tracks live client connections and fans state-change events out to
//! all of them. Failed recipients are pruned in the same pass.

mod connection;
mod dispatcher;
mod events;
mod registry;
mod session;

pub use connection::{Connection, ConnectionId, ConnectionState, Frame};
pub use dispatcher::{BroadcastDispatcher, BroadcastReport, Delivery};
pub use events::{ClientMessage, Event};
pub use registry::ConnectionRegistry;
pub use session::{websocket_route, WebSocketSession};
