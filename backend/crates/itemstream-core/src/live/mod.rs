//! Live connection and subscription module
//!
//! This module handles:
//! - Connection lifecycle (manager.rs)
//! - Verb handler chain (handlers/)
//! - Collection subscriptions and change fan-out (registry.rs)
//! - Host mutation events (bridge.rs)

pub mod bridge;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod registry;

pub use itemstream_commons::ConnectionId;

pub use bridge::{MutationBridge, ITEM_EVENT_CHANNEL_CAPACITY};
pub use handlers::{ExtensionHandler, HandlerChain, HandlerContext, MessageHandler};
pub use manager::ConnectionsManager;
pub use models::{
    Connection, ConnectionEvent, ConnectionRegistration, DispatchReport, EventReceiver,
    ItemEvent, MutationEvent, OutboundReceiver, Subscription, SubscriptionOptions,
    UnsubscribeScope, EVENT_CHANNEL_CAPACITY,
};
pub use registry::{OutboundFilter, SubscriptionRegistry};
