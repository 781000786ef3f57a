//! Client-side connector bridging an in-process command bus to a remote
//! command-routing server over a bidirectional message stream.
//!
//! # Purpose
//! Outbound commands pass the dispatch interceptor chain, get a routing key
//! and priority attached, and travel as unary calls; the reply is delivered
//! through a callback that fires exactly once. Inbound commands arrive on a
//! flow-controlled subscriber stream, wait in a priority queue, and are
//! drained by a worker pool that runs them on the local bus and streams the
//! results back. Subscriptions survive transport failures by being replayed
//! from the local registry on every reconnect.
//!
//! # Design notes
//! The network itself lives behind the [`connection::ConnectionManager`]
//! seam; this crate never dials. Handler execution lives behind the
//! [`local::LocalCommandBus`] seam; [`local::SimpleCommandBus`] covers the
//! in-process case.
pub use crate::bus::RouterCommandBus;
pub use crate::config::RouterConfig;
pub use crate::error::{CommandError, ConfigError, ErrorCode};
pub use crate::interceptor::DispatchInterceptor;
pub use crate::local::{
    CommandCallback, CommandHandler, HandlerInterceptor, LocalCommandBus, SimpleCommandBus,
};
pub use crate::message::{CommandMessage, CommandResult, MetaData};
pub use crate::registration::Registration;
pub use crate::routing::{
    DefaultPriorityCalculator, IdentifierRoutingStrategy, MetadataRoutingStrategy,
    PriorityCalculator, RoutingStrategy,
};
pub use crate::serializer::{JsonSerializer, PayloadSerializer, SerializeError};

mod bus;
mod codec;
pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
mod flow;
mod interceptor;
pub mod local;
pub mod message;
mod queue;
pub mod registration;
pub mod routing;
pub mod serializer;
mod subscriber;
