//! DELETE: remove the targeted record(s) and answer with the deleted key(s)

use serde_json::Value;

use itemstream_commons::websocket::Target;
use itemstream_commons::InboundMessage;

use super::{require_collection, HandlerContext};
use crate::error::{LiveError, Result};

pub(super) async fn execute(ctx: &HandlerContext<'_>, message: &InboundMessage) -> Result<Option<Value>> {
    let collection = require_collection(message)?;
    let target = message.target().ok_or(LiveError::MissingTarget)?;
    let identity = ctx.connection.identity();

    let result = match target {
        Target::Many(keys) => {
            Value::Array(ctx.gateway.delete_many(collection, keys, identity).await?)
        },
        Target::One(key) => ctx.gateway.delete_one(collection, key, identity).await?,
    };
    Ok(Some(result))
}
