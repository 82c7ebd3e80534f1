//! SUBSCRIBE / UNSUBSCRIBE
//!
//! A subscription is only registered after an authorization probe: a
//! `read_by_query` with the message query capped to one row, made with the
//! connection's identity. A failing probe is returned to the client and
//! nothing is registered.

use log::debug;
use serde_json::{json, Map, Value};

use itemstream_commons::{InboundMessage, MessageType, Query};

use super::{require_collection, HandlerContext};
use crate::error::Result;
use crate::live::models::{SubscriptionOptions, UnsubscribeScope};

#[derive(Debug, Clone, Default)]
pub struct SubscribeHandler {
    /// Collections every new connection is subscribed to
    auto_collections: Vec<String>,
}

impl SubscribeHandler {
    pub fn new(auto_collections: Vec<String>) -> Self {
        Self {
            auto_collections: auto_collections
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub(super) async fn execute(
        &self,
        ctx: &HandlerContext<'_>,
        message: &InboundMessage,
    ) -> Result<Option<Value>> {
        if message.message_type == MessageType::Unsubscribe {
            return Ok(Some(self.unsubscribe(ctx, message)));
        }

        let collection = require_collection(message)?;
        probe(ctx, collection, &message.query).await?;

        let options = SubscriptionOptions {
            id: message.id.clone(),
            query: message.query.clone(),
            uid: message.uid.clone(),
        };
        ctx.registry.subscribe(collection, ctx.connection, options);

        let mut body = Map::new();
        body.insert("collection".to_string(), Value::from(collection));
        if let Some(id) = &message.id {
            body.insert("id".to_string(), id.clone());
        }
        body.insert("query".to_string(), serde_json::to_value(&message.query)?);
        Ok(Some(Value::Object(body)))
    }

    fn unsubscribe(&self, ctx: &HandlerContext<'_>, message: &InboundMessage) -> Value {
        let scope = match (&message.uid, &message.collection) {
            (Some(uid), _) => UnsubscribeScope::Uid(uid.clone()),
            (None, Some(collection)) => UnsubscribeScope::Collection(collection.clone()),
            (None, None) => UnsubscribeScope::All,
        };
        let removed = ctx.registry.unsubscribe(ctx.connection.id(), &scope);
        json!({ "removed": removed })
    }

    /// Auto-subscribe the new connection; collections it may not read are
    /// skipped
    pub(super) async fn on_connected(&self, ctx: &HandlerContext<'_>) {
        for collection in &self.auto_collections {
            let query = Query::default();
            match probe(ctx, collection, &query).await {
                Ok(()) => {
                    ctx.registry.subscribe(
                        collection,
                        ctx.connection,
                        SubscriptionOptions::default(),
                    );
                },
                Err(e) => {
                    debug!(
                        "Auto-subscribe to {} skipped for {}: {}",
                        collection,
                        ctx.connection.id(),
                        e
                    );
                },
            }
        }
    }

    pub(super) fn on_closed(&self, ctx: &HandlerContext<'_>) {
        ctx.registry.unsubscribe(ctx.connection.id(), &UnsubscribeScope::All);
    }
}

async fn probe(ctx: &HandlerContext<'_>, collection: &str, query: &Query) -> Result<()> {
    ctx.gateway
        .read_by_query(collection, &query.with_limit(1), ctx.connection.identity())
        .await?;
    Ok(())
}
