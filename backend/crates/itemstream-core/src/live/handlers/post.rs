//! POST: create one record, or many when `data` is an array, and answer
//! with the created records read back through the message query

use serde_json::Value;

use itemstream_commons::InboundMessage;

use super::{require_collection, require_data, HandlerContext};
use crate::error::Result;

pub(super) async fn execute(ctx: &HandlerContext<'_>, message: &InboundMessage) -> Result<Option<Value>> {
    let collection = require_collection(message)?;
    let data = require_data(message)?;
    let identity = ctx.connection.identity();

    let result = match data {
        Value::Array(items) => {
            let keys = ctx.gateway.create_many(collection, items, identity).await?;
            let records = ctx.gateway.read_many(collection, &keys, &message.query, identity).await?;
            Value::Array(records)
        },
        item => {
            let key = ctx.gateway.create_one(collection, item, identity).await?;
            ctx.gateway.read_one(collection, &key, &message.query, identity).await?
        },
    };
    Ok(Some(result))
}
