//! Command bus backed by a remote command router.
//!
//! # Purpose
//! Bridges the application's [`LocalCommandBus`] to the router: outbound
//! commands are intercepted, encoded, and dispatched over a unary call;
//! inbound commands arrive on the subscriber stream, run on the local bus,
//! and their results stream back.
//!
//! # Design notes
//! Construction registers the resubscribe/unsubscribe listeners with the
//! connection manager and eagerly starts the worker pool, so a
//! `RouterCommandBus` must be created inside a Tokio runtime.
use std::sync::Arc;
use tracing::debug;

use crate::codec::CommandCodec;
use crate::config::RouterConfig;
use crate::connection::{CallMetadata, ConnectionManager};
use crate::dispatch::CommandDispatcher;
use crate::error::ConfigError;
use crate::interceptor::{DispatchInterceptor, DispatchInterceptors};
use crate::local::{CommandHandler, HandlerInterceptor, LocalCommandBus};
use crate::message::{CommandMessage, CommandResult};
use crate::registration::Registration;
use crate::routing::{DefaultPriorityCalculator, PriorityCalculator, RoutingStrategy};
use crate::serializer::PayloadSerializer;
use crate::subscriber::RouterSubscriber;

pub struct RouterCommandBus {
    subscriber: Arc<RouterSubscriber>,
    dispatcher: CommandDispatcher,
    dispatch_interceptors: Arc<DispatchInterceptors>,
    local_bus: Arc<dyn LocalCommandBus>,
}

impl RouterCommandBus {
    pub fn new(
        connections: Arc<dyn ConnectionManager>,
        config: RouterConfig,
        local_bus: Arc<dyn LocalCommandBus>,
        serializer: Arc<dyn PayloadSerializer>,
        routing_strategy: Arc<dyn RoutingStrategy>,
    ) -> Result<Self, ConfigError> {
        Self::with_priority_calculator(
            connections,
            config,
            local_bus,
            serializer,
            routing_strategy,
            Arc::new(DefaultPriorityCalculator),
        )
    }

    pub fn with_priority_calculator(
        connections: Arc<dyn ConnectionManager>,
        config: RouterConfig,
        local_bus: Arc<dyn LocalCommandBus>,
        serializer: Arc<dyn PayloadSerializer>,
        routing_strategy: Arc<dyn RoutingStrategy>,
        priority_calculator: Arc<dyn PriorityCalculator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let metadata = CallMetadata::from_config(&config);
        let codec = CommandCodec::new(serializer, config.client_id.clone());
        let client_id = config.client_id.clone();
        let subscriber = RouterSubscriber::new(
            config,
            Arc::clone(&connections),
            Arc::clone(&local_bus),
            codec.clone(),
            metadata.clone(),
        );
        let dispatcher = CommandDispatcher::new(
            connections,
            codec,
            metadata,
            routing_strategy,
            priority_calculator,
            client_id,
        );
        Ok(Self {
            subscriber,
            dispatcher,
            dispatch_interceptors: Arc::new(DispatchInterceptors::default()),
            local_bus,
        })
    }

    /// Fire-and-forget dispatch; failures are logged by the dispatcher.
    pub fn dispatch(&self, command: CommandMessage) {
        self.dispatch_with_callback(command, |_: &CommandMessage, _: CommandResult| {});
    }

    /// Dispatch with a completion callback, invoked exactly once with either
    /// the decoded result or an exceptional result.
    pub fn dispatch_with_callback(
        &self,
        command: CommandMessage,
        callback: impl FnOnce(&CommandMessage, CommandResult) + Send + 'static,
    ) {
        debug!(command = %command.name(), "dispatch command with callback");
        let command = self.dispatch_interceptors.intercept(command);
        self.dispatcher.dispatch(command, Box::new(callback));
    }

    /// Register a local handler and announce the subscription to the router.
    /// Cancelling the registration removes the handler and unsubscribes.
    pub fn subscribe(
        &self,
        command_name: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Registration {
        debug!(command = command_name, "subscribing command handler");
        let local = self.local_bus.subscribe(command_name, handler);
        self.subscriber.subscribe(command_name);
        let subscriber = Arc::clone(&self.subscriber);
        let name = command_name.to_string();
        Registration::new(move || {
            local.cancel();
            subscriber.unsubscribe(&name);
        })
    }

    pub fn register_dispatch_interceptor(
        &self,
        interceptor: Arc<dyn DispatchInterceptor>,
    ) -> Registration {
        self.dispatch_interceptors.register(interceptor)
    }

    /// Handler interceptors belong to the local bus; forwarded verbatim.
    pub fn register_handler_interceptor(
        &self,
        interceptor: Arc<dyn HandlerInterceptor>,
    ) -> Registration {
        self.local_bus.register_handler_interceptor(interceptor)
    }

    /// Disconnect from the router: half-close the subscriber stream and let
    /// the workers drain.
    pub async fn disconnect(&self) {
        self.subscriber.disconnect().await;
    }
}
