//! PATCH: update the targeted record(s) and answer with them read back

use serde_json::Value;

use itemstream_commons::websocket::Target;
use itemstream_commons::InboundMessage;

use super::{require_collection, require_data, HandlerContext};
use crate::error::{LiveError, Result};

pub(super) async fn execute(ctx: &HandlerContext<'_>, message: &InboundMessage) -> Result<Option<Value>> {
    let collection = require_collection(message)?;
    let target = message.target().ok_or(LiveError::MissingTarget)?;
    let data = require_data(message)?;
    let identity = ctx.connection.identity();

    let result = match target {
        Target::Many(keys) => {
            let updated = ctx.gateway.update_many(collection, keys, data, identity).await?;
            let records =
                ctx.gateway.read_many(collection, &updated, &message.query, identity).await?;
            Value::Array(records)
        },
        Target::One(key) => {
            let updated = ctx.gateway.update_one(collection, key, data, identity).await?;
            ctx.gateway.read_one(collection, &updated, &message.query, identity).await?
        },
    };
    Ok(Some(result))
}
