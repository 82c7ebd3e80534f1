//! Socket-side senders
//!
//! Frames produced by the core arrive already encoded; only frames the
//! socket task itself originates (size violations, unsupported data) are
//! encoded here.

use actix_ws::{CloseCode, CloseReason, Session};
use itemstream_commons::{ErrorInfo, ErrorKind, ServerMessage};

/// Send an ERROR frame without correlation id
pub async fn send_error(session: &mut Session, kind: ErrorKind, message: &str) -> Result<(), ()> {
    let msg = ServerMessage::error(ErrorInfo::new(kind, message), None);
    send_message(session, &msg).await
}

pub async fn send_message(session: &mut Session, msg: &ServerMessage) -> Result<(), ()> {
    let text = msg.encode().map_err(|_| ())?;
    send_text(session, text).await
}

/// Write an already encoded frame
pub async fn send_text(session: &mut Session, text: String) -> Result<(), ()> {
    session.text(text).await.map_err(|_| ())
}

/// Close with `code`, ignoring a transport that is already gone
pub async fn close_with(session: Session, code: CloseCode, description: &str) {
    let _ = session
        .close(Some(CloseReason {
            code,
            description: Some(description.to_string()),
        }))
        .await;
}
