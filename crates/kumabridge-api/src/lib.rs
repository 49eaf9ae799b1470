// kumabridge-api: Async Socket.IO client for Uptime Kuma style real-time servers

pub mod client;
pub mod error;
pub mod packet;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{ConnectionState, EventReceiver, SocketClient, SocketEvent};
pub use error::Error;
pub use transport::ReconnectConfig;
