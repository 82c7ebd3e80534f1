//! WebSocket upgrade endpoint and per-connection socket task
//!
//! The endpoint authenticates the handshake before upgrading. Accepted
//! sockets get one task which:
//! - feeds text frames to the ConnectionsManager one at a time
//! - writes frames queued on the connection's outbound channel
//! - reacts to control events (ping, heartbeat timeout, shutdown)
//!
//! Every exit path ends in `ConnectionsManager::close`.

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, Message, Session};
use futures_util::StreamExt;
use itemstream_commons::{ErrorInfo, ErrorKind};
use itemstream_core::live::{ConnectionEvent, ConnectionRegistration, ConnectionsManager};
use log::{debug, error, info, warn};
use std::sync::Arc;

use super::events::{close_with, send_error, send_text};
use super::models::WsContext;
use crate::auth::{admit, Handshake};

/// GET <websocket.path> - Establish a WebSocket connection
///
/// Refused with 401 when the handshake yields no identity, or no identity
/// with a role while the server is not public. Refused with 503 during
/// shutdown or when the connection limit is reached.
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    ctx: web::Data<WsContext>,
) -> Result<HttpResponse, Error> {
    let manager = &ctx.connections_manager;
    if manager.is_shutting_down() {
        return Ok(HttpResponse::ServiceUnavailable().body("Server is shutting down"));
    }

    let admitted = match Handshake::from_request(&req) {
        Ok(handshake) => admit(ctx.identity_provider.as_ref(), &handshake, ctx.public).await,
        Err(e) => Err(e),
    };
    let identity = match admitted {
        Ok(identity) => identity,
        Err(e) => {
            warn!(
                "WebSocket upgrade refused from {:?}: {}",
                req.connection_info().realip_remote_addr(),
                e
            );
            let body = ErrorInfo::new(ErrorKind::Unauthorized, e.to_string());
            return Ok(HttpResponse::Unauthorized().json(body));
        },
    };

    let Some(registration) = manager.register_connection(identity) else {
        return Ok(HttpResponse::ServiceUnavailable().body("Connection limit reached"));
    };

    let (response, session, msg_stream) = match actix_ws::handle(&req, stream) {
        Ok(parts) => parts,
        Err(e) => {
            manager.close(registration.connection.id()).await;
            return Err(e);
        },
    };

    let manager = Arc::clone(manager);
    let max_message_size = ctx.max_message_size;
    actix_web::rt::spawn(async move {
        handle_websocket(session, msg_stream, registration, manager, max_message_size).await;
    });

    Ok(response)
}

/// Main socket loop
async fn handle_websocket(
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
    registration: ConnectionRegistration,
    manager: Arc<ConnectionsManager>,
    max_message_size: usize,
) {
    let ConnectionRegistration {
        connection,
        mut outbound_rx,
        mut event_rx,
    } = registration;
    let connection_id = connection.id().clone();

    manager.connected(&connection).await;

    loop {
        tokio::select! {
            biased;

            // Control events first
            event = event_rx.recv() => {
                match event {
                    Some(ConnectionEvent::SendPing) => {
                        if session.ping(b"").await.is_err() {
                            break;
                        }
                    }
                    Some(ConnectionEvent::HeartbeatTimeout) => {
                        warn!("WebSocket heartbeat timeout: {}", connection_id);
                        close_with(session, CloseCode::Normal, "Heartbeat timeout").await;
                        break;
                    }
                    Some(ConnectionEvent::Shutdown) => {
                        info!("WebSocket shutdown requested: {}", connection_id);
                        close_with(session, CloseCode::Away, "Server shutting down").await;
                        break;
                    }
                    None => break,
                }
            }

            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(Message::Ping(bytes))) => {
                        connection.touch();
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        connection.touch();
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_message_size {
                            warn!("Message too large from {}: {} bytes (max {})",
                                connection_id, text.len(), max_message_size);
                            connection.touch();
                            let _ = send_error(&mut session, ErrorKind::MalformedMessage,
                                &format!("Message exceeds maximum size of {} bytes", max_message_size)).await;
                            continue;
                        }
                        // Sequential: the next frame is read only after this one is handled
                        manager.handle_frame(&connection, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Binary frame from {} rejected", connection_id);
                        let _ = send_error(&mut session, ErrorKind::MalformedMessage,
                            "Binary frames are not supported").await;
                    }
                    Some(Ok(Message::Close(reason))) => {
                        debug!("Client requested close: {} {:?}", connection_id, reason);
                        let _ = session.close(reason).await;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Continuation, Nop
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended: {}", connection_id);
                        break;
                    }
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(text) => {
                        if send_text(&mut session, text).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    manager.close(&connection_id).await;
}
