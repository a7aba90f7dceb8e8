//! One client connection: handshake, then requests and pushes on the same socket

use anyhow::{Context, Result};
use bytes::BytesMut;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parley_core::{Ack, ChatError, Gateway, Request, Session};
use parley_store::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

/// Longest accepted line, in bytes
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// How long a client may take to send its handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// First line sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeFrame {
    #[serde(default)]
    pub token: Option<String>,
}

/// Sent once the handshake succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum WelcomeFrame {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: UserId },
}

/// Reply to one request line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub ack: Option<u64>,
    #[serde(flatten)]
    pub body: Ack,
}

#[derive(Deserialize)]
struct FrameId {
    #[serde(default)]
    id: Option<u64>,
}

/// One inbound line, or notice that an overlong one was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    Oversized,
}

/// Newline-delimited codec that survives overlong lines.
///
/// `LinesCodec` discards the rest of an overlong line on its own, but `Framed`
/// stops reading after any decoder error. Reporting the drop as an item keeps
/// the stream alive so the client can be told and carry on.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn lift(
        result: std::result::Result<Option<String>, LinesCodecError>,
    ) -> std::result::Result<Option<Inbound>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Inbound::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::Oversized)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Inbound>, Self::Error> {
        Self::lift(self.lines.decode(buf))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Inbound>, Self::Error> {
        Self::lift(self.lines.decode_eof(buf))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        self.lines.encode(line, dst)
    }
}

type Lines<S> = Framed<S, FrameCodec>;

/// Drive a connection until the client goes away
pub async fn handle_connection<S>(stream: S, gateway: Gateway) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Framed::new(stream, FrameCodec::new(MAX_LINE_BYTES));
    let (outbox, mut pushes) = mpsc::unbounded();

    // A failed handshake closes the socket without a reply
    let token = match read_handshake(&mut lines).await {
        Ok(token) => token,
        Err(e) => {
            debug!("Closing connection: {}", e);
            return Ok(());
        }
    };
    let session = match gateway.connect(token.as_deref(), outbox).await {
        Ok(session) => session,
        Err(e) => {
            debug!("Closing connection: {}", e);
            return Ok(());
        }
    };

    let result = run_session(&mut lines, &mut pushes, &gateway, &session).await;
    gateway.disconnect(&session).await;
    info!("Connection {} closed for {}", session.connection, session.user);
    result
}

async fn read_handshake<S>(lines: &mut Lines<S>) -> std::result::Result<Option<String>, ChatError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = match tokio::time::timeout(HANDSHAKE_TIMEOUT, lines.next()).await {
        Ok(Some(Ok(Inbound::Line(line)))) => line,
        Ok(Some(Ok(Inbound::Oversized))) => {
            return Err(ChatError::Unauthenticated("handshake line too long".into()))
        }
        Ok(Some(Err(e))) => {
            return Err(ChatError::Unauthenticated(format!("unreadable handshake: {}", e)))
        }
        Ok(None) => return Err(ChatError::Unauthenticated("closed before handshake".into())),
        Err(_) => return Err(ChatError::Unauthenticated("handshake timed out".into())),
    };

    let frame: HandshakeFrame = serde_json::from_str(&line)
        .map_err(|e| ChatError::Unauthenticated(format!("malformed handshake: {}", e)))?;
    Ok(frame.token)
}

async fn run_session<S>(
    lines: &mut Lines<S>,
    pushes: &mut mpsc::UnboundedReceiver<parley_core::ServerEvent>,
    gateway: &Gateway,
    session: &Session,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let welcome = WelcomeFrame::Connected {
        user_id: session.user.clone(),
    };
    lines
        .send(serde_json::to_string(&welcome)?)
        .await
        .context("Failed to send welcome")?;

    loop {
        tokio::select! {
            inbound = lines.next() => match inbound {
                Some(Ok(Inbound::Line(line))) => {
                    let reply = handle_line(gateway, session, &line).await;
                    lines
                        .send(serde_json::to_string(&reply)?)
                        .await
                        .context("Failed to send reply")?;
                }
                Some(Ok(Inbound::Oversized)) => {
                    debug!("Discarded oversized line from {}", session.connection);
                    let reply = ReplyFrame {
                        ack: None,
                        body: Ack::error(&ChatError::InvalidArgument(format!(
                            "frame exceeds {} bytes",
                            MAX_LINE_BYTES
                        ))),
                    };
                    lines
                        .send(serde_json::to_string(&reply)?)
                        .await
                        .context("Failed to send reply")?;
                }
                Some(Err(e)) => {
                    warn!("Dropping {} after read error: {}", session.connection, e);
                    return Ok(());
                }
                None => return Ok(()),
            },
            Some(event) = pushes.next() => {
                lines
                    .send(serde_json::to_string(&event)?)
                    .await
                    .context("Failed to send push")?;
            }
        }
    }
}

async fn handle_line(gateway: &Gateway, session: &Session, line: &str) -> ReplyFrame {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return ReplyFrame {
                ack: None,
                body: Ack::error(&ChatError::InvalidArgument(format!("malformed frame: {}", e))),
            }
        }
    };

    let ack = FrameId::deserialize(&value).ok().and_then(|frame| frame.id);
    let body = match Request::deserialize(value) {
        Ok(request) => gateway.handle(session, request).await,
        Err(e) => Ack::error(&ChatError::InvalidArgument(format!("unsupported request: {}", e))),
    };
    ReplyFrame { ack, body }
}
