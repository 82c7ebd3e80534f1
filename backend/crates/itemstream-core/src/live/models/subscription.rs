use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use itemstream_commons::{ConnectionId, Query};
use serde_json::Value;

use super::connection::Connection;
use crate::gateway::key_string;

/// Per-subscription settings taken from the SUBSCRIBE message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionOptions {
    /// Only changes to this record are delivered
    pub id: Option<Value>,
    pub query: Query,
    pub uid: Option<String>,
}

/// What an unsubscribe call removes for a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeScope {
    /// Every subscription of the connection
    All,
    /// The subscription registered with this uid
    Uid(String),
    /// Every subscription of the connection on this collection
    Collection(String),
}

/// One registered interest of a connection in a collection
#[derive(Debug)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) connection_id: ConnectionId,
    pub(crate) connection: Weak<Connection>,
    pub(crate) collection: String,
    pub(crate) options: SubscriptionOptions,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        collection: String,
        connection: &Arc<Connection>,
        options: SubscriptionOptions,
    ) -> Self {
        Self {
            id,
            connection_id: connection.id().clone(),
            connection: Arc::downgrade(connection),
            collection,
            options,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn uid(&self) -> Option<&str> {
        self.options.uid.as_deref()
    }

    pub fn target(&self) -> Option<&Value> {
        self.options.id.as_ref()
    }

    pub fn query(&self) -> &Query {
        &self.options.query
    }

    /// Owning connection, if it is still alive
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn matches_scope(&self, connection_id: &ConnectionId, scope: &UnsubscribeScope) -> bool {
        if self.connection_id != *connection_id {
            return false;
        }
        match scope {
            UnsubscribeScope::All => true,
            UnsubscribeScope::Uid(uid) => self.uid() == Some(uid.as_str()),
            UnsubscribeScope::Collection(collection) => self.collection == *collection,
        }
    }

    /// Whether a change to `keys` concerns this subscription
    pub fn watches_any(&self, keys: &[Value]) -> bool {
        match &self.options.id {
            None => true,
            Some(target) => {
                let target = key_string(target);
                keys.iter().any(|k| key_string(k) == target)
            },
        }
    }
}

/// Outcome of one dispatch call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// SUBSCRIPTION frames queued
    pub delivered: usize,
    /// Subscriptions not concerned, inactive, gone, or with an empty re-read
    pub skipped: usize,
    /// Re-reads or sends that failed
    pub failed: usize,
}
