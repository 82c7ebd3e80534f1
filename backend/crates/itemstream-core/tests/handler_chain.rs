mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::TestServer;
use itemstream_commons::{Identity, InboundMessage};
use itemstream_configs::ServerConfig;
use itemstream_core::live::{ExtensionHandler, HandlerChain, HandlerContext};
use itemstream_core::Result;
use serde_json::{json, Value};

struct PingDb;

#[async_trait]
impl ExtensionHandler for PingDb {
    fn message_type(&self) -> &str {
        "PING_DB"
    }

    async fn execute(
        &self,
        ctx: &HandlerContext<'_>,
        _message: &InboundMessage,
    ) -> Result<Option<Value>> {
        let schema = ctx.gateway.schema().await?;
        Ok(Some(json!({"pong": true, "collections": schema.collections().count()})))
    }
}

fn editor() -> Identity {
    Identity::with_role("e1", "editor")
}

#[tokio::test]
async fn test_get_echoes_uid_and_applies_query() {
    let server = TestServer::new(&ServerConfig::default());
    server.seed_articles().await;
    let mut client = server.connect(Identity::with_role("v1", "viewer")).await;

    let response = client
        .request(json!({
            "type": "get",
            "collection": "Articles",
            "query": {"filter": {"status": {"_eq": "published"}}, "fields": ["title"], "sort": ["-id"]},
            "uid": "g1"
        }))
        .await;

    assert_eq!(response["type"], "RESPONSE");
    assert_eq!(response["uid"], "g1");
    assert_eq!(response["data"], json!([{"title": "Third"}, {"title": "First"}]));
}

#[tokio::test]
async fn test_frame_without_uid_omits_it() {
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(Identity::anonymous()).await;

    let response = client.request(json!({"type": "GET", "collection": "authors"})).await;
    assert_eq!(response, json!({"type": "RESPONSE", "data": []}));
}

#[tokio::test]
async fn test_post_single_and_many() {
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(editor()).await;

    let single = client
        .request(json!({"type": "POST", "collection": "articles", "data": {"title": "One"}}))
        .await;
    assert_eq!(single["data"], json!({"id": 1, "title": "One"}));

    let many = client
        .request(json!({
            "type": "POST",
            "collection": "articles",
            "data": [{"title": "Two"}, {"title": "Three"}],
            "query": {"fields": ["id"]}
        }))
        .await;
    assert_eq!(many["data"], json!([{"id": 2}, {"id": 3}]));
}

#[tokio::test]
async fn test_post_with_largest_key_is_rejected() {
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(editor()).await;

    let rejected = client
        .request(json!({
            "type": "POST",
            "collection": "articles",
            "uid": "big",
            "data": {"id": u64::MAX, "title": "Edge"}
        }))
        .await;
    assert_eq!(rejected["type"], "ERROR");
    assert_eq!(rejected["uid"], "big");
    assert_eq!(rejected["data"]["kind"], "InvalidPayload");

    // Connection keeps working and key assignment is unaffected
    let next = client
        .request(json!({"type": "POST", "collection": "articles", "data": {"title": "Next"}}))
        .await;
    assert_eq!(next["data"], json!({"id": 1, "title": "Next"}));
    assert_eq!(server.manager.connection_count(), 1);
}

#[tokio::test]
async fn test_patch_by_id_and_ids() {
    let server = TestServer::new(&ServerConfig::default());
    server.seed_articles().await;
    let mut client = server.connect(editor()).await;

    let one = client
        .request(json!({"type": "PATCH", "collection": "articles", "id": 2, "data": {"status": "published"}}))
        .await;
    assert_eq!(one["data"]["status"], "published");
    assert_eq!(one["data"]["title"], "Second");

    let many = client
        .request(json!({
            "type": "PATCH",
            "collection": "articles",
            "ids": [1, 3],
            "data": {"status": "archived"},
            "query": {"fields": ["status"]}
        }))
        .await;
    assert_eq!(many["data"], json!([{"status": "archived"}, {"status": "archived"}]));
}

#[tokio::test]
async fn test_delete_answers_with_keys() {
    let server = TestServer::new(&ServerConfig::default());
    server.seed_articles().await;
    let mut client = server.connect(editor()).await;

    let one = client.request(json!({"type": "DELETE", "collection": "articles", "id": 1})).await;
    assert_eq!(one["data"], 1);

    let many = client
        .request(json!({"type": "DELETE", "collection": "articles", "ids": [2, 3], "uid": "d"}))
        .await;
    assert_eq!(many["data"], json!([2, 3]));
    assert_eq!(many["uid"], "d");
}

#[tokio::test]
async fn test_writes_without_target_never_reach_gateway() {
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(editor()).await;

    let patch = client
        .request(json!({"type": "PATCH", "collection": "articles", "data": {"title": "x"}, "uid": "p"}))
        .await;
    assert_eq!(patch["type"], "ERROR");
    assert_eq!(patch["data"]["kind"], "MissingTarget");
    assert_eq!(patch["data"]["message"], "Either 'ids' or 'id' is required");
    assert_eq!(patch["uid"], "p");

    let delete = client
        .request(json!({"type": "DELETE", "collection": "articles", "ids": []}))
        .await;
    assert_eq!(delete["data"]["kind"], "MissingTarget");

    assert_eq!(server.gateway.calls(), 0);
}

#[tokio::test]
async fn test_validation_errors_carry_uid() {
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(editor()).await;

    let no_collection = client.request(json!({"type": "GET", "uid": "a"})).await;
    assert_eq!(no_collection["data"]["kind"], "MissingCollection");
    assert_eq!(no_collection["uid"], "a");

    let no_data = client
        .request(json!({"type": "POST", "collection": "articles", "uid": "b"}))
        .await;
    assert_eq!(no_data["data"]["kind"], "MissingData");
    assert_eq!(no_data["uid"], "b");

    let unknown = client
        .request(json!({"type": "GET", "collection": "invoices", "uid": "c"}))
        .await;
    assert_eq!(unknown["data"]["kind"], "UnknownCollection");
    assert_eq!(unknown["uid"], "c");

    client.send(json!("not an object")).await;
    let malformed = client.recv().await;
    assert_eq!(malformed["data"]["kind"], "MalformedMessage");
    assert!(malformed.get("uid").is_none());

    assert_eq!(server.gateway.calls(), 0);
}

#[tokio::test]
async fn test_gateway_errors_are_reported() {
    let server = TestServer::new(&ServerConfig::default());
    server.seed_articles().await;
    let mut viewer = server.connect(Identity::with_role("v1", "viewer")).await;

    let forbidden = viewer
        .request(json!({"type": "DELETE", "collection": "articles", "id": 1, "uid": "f"}))
        .await;
    assert_eq!(forbidden["data"]["kind"], "Unauthorized");
    assert_eq!(forbidden["uid"], "f");

    let mut editor = server.connect(editor()).await;
    let missing = editor
        .request(json!({"type": "PATCH", "collection": "articles", "id": 42, "data": {"title": "x"}}))
        .await;
    assert_eq!(missing["data"]["kind"], "NotFound");
}

#[tokio::test]
async fn test_unclaimed_type_until_extension_registered() {
    // 1. Standard chain does not know the verb
    let server = TestServer::new(&ServerConfig::default());
    let mut client = server.connect(Identity::anonymous()).await;
    let response = client.request(json!({"type": "ping_db", "uid": "x"})).await;
    assert_eq!(response["type"], "ERROR");
    assert_eq!(response["data"]["kind"], "UnsupportedMessageType");
    assert_eq!(response["uid"], "x");

    // 2. Chain with the extension appended claims it
    let mut chain = HandlerChain::from_config(&ServerConfig::default());
    chain.register_extension(Arc::new(PingDb));
    assert_eq!(chain.handler_names().last(), Some(&"PING_DB"));

    let (connection, mut rx, _events) =
        itemstream_core::live::Connection::detached(Identity::anonymous(), 8);
    let gateway: Arc<dyn itemstream_core::DataGateway> = server.gateway.clone();
    let ctx = HandlerContext {
        connection: &connection,
        gateway: &gateway,
        registry: &server.registry,
    };
    let message = itemstream_commons::websocket::parse_inbound(
        r#"{"type":"PING_DB","uid":"x"}"#,
        &gateway.schema().await.expect("schema"),
    )
    .expect("valid frame");
    chain.route(&ctx, message).await;

    let frame: Value = serde_json::from_str(&rx.recv().await.expect("frame")).expect("json");
    assert_eq!(frame["type"], "RESPONSE");
    assert_eq!(frame["data"], json!({"pong": true, "collections": 2}));
    assert_eq!(frame["uid"], "x");
}

#[tokio::test]
async fn test_disabled_handler_is_not_registered() {
    let mut config = ServerConfig::default();
    config.handlers.delete = false;
    let chain = HandlerChain::from_config(&config);
    assert!(!chain.handler_names().contains(&"DELETE"));

    let server = TestServer::new(&config);
    server.seed_articles().await;
    let mut client = server.connect(editor()).await;
    let response = client
        .request(json!({"type": "DELETE", "collection": "articles", "id": 1}))
        .await;
    assert_eq!(response["data"]["kind"], "UnsupportedMessageType");
}

#[tokio::test]
async fn test_unsubscribe_by_collection_reports_count() {
    let server = TestServer::new(&ServerConfig::default());
    server.seed_articles().await;
    let mut client = server.connect(Identity::with_role("v1", "viewer")).await;

    client.request(json!({"type": "SUBSCRIBE", "collection": "articles"})).await;
    client.request(json!({"type": "SUBSCRIBE", "collection": "articles", "id": 2})).await;
    client.request(json!({"type": "SUBSCRIBE", "collection": "authors"})).await;

    let response = client
        .request(json!({"type": "UNSUBSCRIBE", "collection": "articles"}))
        .await;
    assert_eq!(response["data"], json!({"removed": 2}));
    assert_eq!(server.registry.connection_subscription_count(client.id()), 1);
}
