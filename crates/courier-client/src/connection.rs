//! Collaborator seams toward the connection manager and the router channel.
//!
//! # Purpose
//! The connector never dials or reconnects by itself; it borrows streams and
//! channels from a [`ConnectionManager`] and reacts to the connect/disconnect
//! notifications that manager emits. Everything here is the boundary the real
//! transport (or an in-process fake) implements.
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use courier_wire::{ClientMessage, ServerMessage, WireCommand, WireCommandResponse};

use crate::config::RouterConfig;

pub const ACCESS_TOKEN_HEADER: &str = "access-token";
pub const ROUTING_CONTEXT_HEADER: &str = "routing-context";

/// Per-call headers attached to every stream open and unary dispatch.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    entries: Vec<(String, String)>,
}

impl CallMetadata {
    pub fn from_config(config: &RouterConfig) -> Self {
        let mut entries = Vec::new();
        if let Some(token) = &config.token {
            entries.push((ACCESS_TOKEN_HEADER.to_string(), token.clone()));
        }
        if let Some(context) = &config.context {
            entries.push((ROUTING_CONTEXT_HEADER.to_string(), context.clone()));
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// Terminal stream failure reported by the transport.
#[derive(Debug, Clone)]
pub struct StreamError {
    kind: StreamErrorKind,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The peer is unreachable; the connection manager owns recovery.
    Unavailable,
    /// Any other terminal failure on an established stream.
    Internal,
}

impl StreamError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.kind == StreamErrorKind::Unavailable
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamErrorKind::Unavailable => write!(f, "unavailable: {}", self.message),
            StreamErrorKind::Internal => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StreamError {}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("no connection to the command router: {0}")]
    Unavailable(String),
    #[error("command stream closed")]
    StreamClosed,
    #[error("{0}")]
    Internal(String),
}

/// Item travelling from the connector to the transport on the subscriber
/// stream: a protocol message, or the half-close signal.
#[derive(Debug)]
pub enum OutboundItem {
    Message(ClientMessage),
    Complete,
}

/// Send side of the subscriber stream. Sends hand the message to the
/// transport and return; the transport buffers.
#[derive(Debug, Clone)]
pub struct OutboundStream {
    tx: mpsc::UnboundedSender<OutboundItem>,
}

impl OutboundStream {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), ConnectionError> {
        self.tx
            .send(OutboundItem::Message(message))
            .map_err(|_| ConnectionError::StreamClosed)
    }

    pub fn complete(&self) {
        let _ = self.tx.send(OutboundItem::Complete);
    }
}

/// Inbound half of the subscriber stream, driven by the transport.
pub trait StreamObserver: Send + Sync {
    fn on_next(&self, message: ServerMessage);
    fn on_error(&self, error: StreamError);
    fn on_completed(&self);
}

/// Terminal-state observer for the unary dispatch call. The transport invokes
/// at most one of `on_next`/`on_error` followed by `on_completed`.
pub trait ResponseObserver: Send {
    fn on_next(&mut self, response: WireCommandResponse);
    fn on_error(&mut self, error: StreamError);
    fn on_completed(&mut self);
}

/// Channel able to carry a single-request, single-response dispatch call.
pub trait DispatchChannel: Send + Sync {
    fn dispatch(
        &self,
        command: WireCommand,
        metadata: CallMetadata,
        observer: Box<dyn ResponseObserver>,
    );
}

pub type ConnectionListener = Arc<dyn Fn() + Send + Sync>;

/// Owner of the underlying transport. Dials, multiplexes, and notifies; the
/// connector borrows streams and channels from it.
pub trait ConnectionManager: Send + Sync + 'static {
    /// Channel for outbound unary dispatch calls.
    fn channel(&self) -> Result<Arc<dyn DispatchChannel>, ConnectionError>;

    /// Open the bidirectional command stream, delivering inbound traffic to
    /// `observer` and returning the send side.
    fn open_command_stream(
        &self,
        observer: Arc<dyn StreamObserver>,
        metadata: &CallMetadata,
    ) -> Result<OutboundStream, ConnectionError>;

    fn add_reconnect_listener(&self, listener: ConnectionListener);
    fn add_disconnect_listener(&self, listener: ConnectionListener);
}
