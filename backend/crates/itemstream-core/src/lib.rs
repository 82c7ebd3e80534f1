// itemstream Core Library
//
// Transport-agnostic engine behind the WebSocket endpoint: the data gateway
// seam, the verb handler chain, the subscription registry, the connections
// manager and the mutation event bridge.

pub mod error;
pub mod gateway;
pub mod live;

pub use error::{LiveError, Result};
pub use gateway::{DataGateway, GatewayError, MemoryGateway};
