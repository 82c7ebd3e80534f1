//! GET: read records matching the message query

use serde_json::Value;

use itemstream_commons::InboundMessage;

use super::{require_collection, HandlerContext};
use crate::error::Result;

pub(super) async fn execute(ctx: &HandlerContext<'_>, message: &InboundMessage) -> Result<Option<Value>> {
    let collection = require_collection(message)?;
    let records = ctx
        .gateway
        .read_by_query(collection, &message.query, ctx.connection.identity())
        .await?;
    Ok(Some(Value::Array(records)))
}
