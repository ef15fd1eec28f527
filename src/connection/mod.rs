//! Connection Module
//!
//! Lifecycle of the shared store connection and the transports behind it.

mod backoff;
mod manager;
mod memory;
mod remote;
mod state;
mod transport;

pub use backoff::BackoffPolicy;
pub use manager::ConnectionManager;
pub use memory::{MemoryConnector, MemoryTransport};
pub use remote::{RedisConnector, RedisTransport};
pub use state::{ConnectionEvent, ConnectionInfo, ConnectionState};
pub use transport::{Connector, ListEnd, Transport, TransportResult};
