//! Verb handlers
//!
//! The [`HandlerChain`] holds the handlers registered at load time, in order.
//! Each inbound message is offered to them in turn; the first one that claims
//! it executes exclusively. Lifecycle events (connected, closed) reach every
//! handler.
//!
//! Standard handlers, registered in this order when enabled:
//! - GET (get.rs)
//! - POST (post.rs)
//! - PATCH (patch.rs)
//! - DELETE (delete.rs)
//! - SUBSCRIBE / UNSUBSCRIBE (subscribe.rs)
//!
//! Custom verbs are added with [`HandlerChain::register_extension`].

mod delete;
mod extension;
mod get;
mod patch;
mod post;
mod subscribe;

pub use extension::ExtensionHandler;
pub use subscribe::SubscribeHandler;

use std::sync::Arc;

use itemstream_commons::{InboundMessage, MessageType, ServerMessage};
use itemstream_configs::{HandlerSettings, ServerConfig};
use log::debug;
use serde_json::Value;

use super::models::Connection;
use super::registry::SubscriptionRegistry;
use crate::error::{LiveError, Result};
use crate::gateway::DataGateway;

/// Everything a handler may touch while serving one connection
pub struct HandlerContext<'a> {
    pub connection: &'a Arc<Connection>,
    pub gateway: &'a Arc<dyn DataGateway>,
    pub registry: &'a SubscriptionRegistry,
}

/// A registered request handler
#[derive(Clone)]
pub enum MessageHandler {
    Get,
    Post,
    Patch,
    Delete,
    Subscribe(SubscribeHandler),
    Extension(Arc<dyn ExtensionHandler>),
}

impl MessageHandler {
    /// Whether the handler is switched on in the configuration
    pub fn is_enabled(&self, settings: &HandlerSettings) -> bool {
        match self {
            MessageHandler::Get => settings.get,
            MessageHandler::Post => settings.post,
            MessageHandler::Patch => settings.patch,
            MessageHandler::Delete => settings.delete,
            MessageHandler::Subscribe(_) => settings.subscribe,
            MessageHandler::Extension(_) => true,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MessageHandler::Get => "GET",
            MessageHandler::Post => "POST",
            MessageHandler::Patch => "PATCH",
            MessageHandler::Delete => "DELETE",
            MessageHandler::Subscribe(_) => "SUBSCRIBE",
            MessageHandler::Extension(ext) => ext.message_type(),
        }
    }

    pub fn claims(&self, message: &InboundMessage) -> bool {
        match self {
            MessageHandler::Get => message.message_type == MessageType::Get,
            MessageHandler::Post => message.message_type == MessageType::Post,
            MessageHandler::Patch => message.message_type == MessageType::Patch,
            MessageHandler::Delete => message.message_type == MessageType::Delete,
            MessageHandler::Subscribe(_) => matches!(
                message.message_type,
                MessageType::Subscribe | MessageType::Unsubscribe
            ),
            MessageHandler::Extension(ext) => ext.claims(message),
        }
    }

    /// Execute a claimed message. `Some(data)` is sent back as RESPONSE.
    pub async fn execute(
        &self,
        ctx: &HandlerContext<'_>,
        message: &InboundMessage,
    ) -> Result<Option<Value>> {
        match self {
            MessageHandler::Get => get::execute(ctx, message).await,
            MessageHandler::Post => post::execute(ctx, message).await,
            MessageHandler::Patch => patch::execute(ctx, message).await,
            MessageHandler::Delete => delete::execute(ctx, message).await,
            MessageHandler::Subscribe(handler) => handler.execute(ctx, message).await,
            MessageHandler::Extension(ext) => ext.execute(ctx, message).await,
        }
    }

    pub async fn on_connected(&self, ctx: &HandlerContext<'_>) {
        match self {
            MessageHandler::Subscribe(handler) => handler.on_connected(ctx).await,
            MessageHandler::Extension(ext) => ext.on_connected(ctx).await,
            _ => {},
        }
    }

    pub async fn on_closed(&self, ctx: &HandlerContext<'_>) {
        match self {
            MessageHandler::Subscribe(handler) => handler.on_closed(ctx),
            MessageHandler::Extension(ext) => ext.on_closed(ctx).await,
            _ => {},
        }
    }
}

/// Ordered set of handlers, populated once at startup
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<MessageHandler>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard handlers enabled in `config`, in GET, POST, PATCH, DELETE,
    /// SUBSCRIBE order
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut chain = Self::new();
        let standard = [
            MessageHandler::Get,
            MessageHandler::Post,
            MessageHandler::Patch,
            MessageHandler::Delete,
            MessageHandler::Subscribe(SubscribeHandler::new(
                config.subscriptions.auto_collections.clone(),
            )),
        ];
        for handler in standard {
            if handler.is_enabled(&config.handlers) {
                chain.register(handler);
            } else {
                debug!("Handler {} disabled by configuration", handler.name());
            }
        }
        chain
    }

    pub fn register(&mut self, handler: MessageHandler) {
        debug!("Registering handler {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn register_extension(&mut self, handler: Arc<dyn ExtensionHandler>) {
        self.register(MessageHandler::Extension(handler));
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(MessageHandler::name).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer `message` to the handlers and answer on the connection.
    ///
    /// Every failure becomes an ERROR frame echoing the message's uid.
    pub async fn route(&self, ctx: &HandlerContext<'_>, message: InboundMessage) {
        let uid = message.uid();
        let Some(handler) = self.handlers.iter().find(|h| h.claims(&message)) else {
            let err = LiveError::UnsupportedMessageType(message.message_type.as_str().to_string());
            debug!("Unclaimed message from {}: {}", ctx.connection.id(), err);
            ctx.connection.send_or_log(&ServerMessage::error(err.info(), uid));
            return;
        };

        debug!(
            "{} {} from {} (uid={:?})",
            message.message_type.as_str(),
            message.collection.as_deref().unwrap_or("-"),
            ctx.connection.id(),
            uid
        );

        match handler.execute(ctx, &message).await {
            Ok(Some(data)) => ctx.connection.send_or_log(&ServerMessage::response(data, uid)),
            Ok(None) => {},
            Err(e) => {
                debug!(
                    "{} failed for {}: {}",
                    message.message_type.as_str(),
                    ctx.connection.id(),
                    e
                );
                ctx.connection.send_or_log(&ServerMessage::error(e.info(), uid));
            },
        }
    }

    pub async fn connected(&self, ctx: &HandlerContext<'_>) {
        for handler in &self.handlers {
            handler.on_connected(ctx).await;
        }
    }

    pub async fn closed(&self, ctx: &HandlerContext<'_>) {
        for handler in &self.handlers {
            handler.on_closed(ctx).await;
        }
    }
}

/// The message's collection, or `MissingCollection`
pub(crate) fn require_collection(message: &InboundMessage) -> Result<&str> {
    message.collection.as_deref().ok_or(LiveError::MissingCollection)
}

/// The message's data payload, or `MissingData`
pub(crate) fn require_data(message: &InboundMessage) -> Result<&Value> {
    message.data.as_ref().ok_or(LiveError::MissingData)
}
