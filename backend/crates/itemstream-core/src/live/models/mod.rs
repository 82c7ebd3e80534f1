//! Consolidated model definitions for the live engine

mod connection;
mod event;
mod subscription;

pub use connection::{
    Connection, ConnectionEvent, ConnectionRegistration, EventReceiver, EventSender,
    OutboundReceiver, OutboundSender, EVENT_CHANNEL_CAPACITY,
};
pub use event::{ItemEvent, MutationEvent};
pub use subscription::{DispatchReport, Subscription, SubscriptionOptions, UnsubscribeScope};
