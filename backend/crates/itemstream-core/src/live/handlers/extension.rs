use async_trait::async_trait;
use serde_json::Value;

use itemstream_commons::InboundMessage;

use super::HandlerContext;
use crate::error::Result;

/// Handler for a custom message type, registered explicitly at startup.
///
/// The default `claims` matches the upper-cased message type exactly.
#[async_trait]
pub trait ExtensionHandler: Send + Sync {
    /// Upper-case message type, e.g. `"PING_DB"`
    fn message_type(&self) -> &str;

    fn claims(&self, message: &InboundMessage) -> bool {
        message.message_type.as_str() == self.message_type()
    }

    async fn execute(
        &self,
        ctx: &HandlerContext<'_>,
        message: &InboundMessage,
    ) -> Result<Option<Value>>;

    async fn on_connected(&self, _ctx: &HandlerContext<'_>) {}

    async fn on_closed(&self, _ctx: &HandlerContext<'_>) {}
}
