//! Outbound command dispatch over the unary router call.
//!
//! Every dispatch resolves to exactly one callback invocation: the three
//! transport terminals are funnelled through a once-only latch, and the
//! preparation path converts its own failures into a dispatch-error result
//! instead of returning them to the caller.
use std::sync::Arc;
use tracing::{debug, warn};

use courier_wire::WireCommandResponse;

use crate::codec::CommandCodec;
use crate::connection::{
    CallMetadata, ConnectionManager, ResponseObserver, StreamError,
};
use crate::error::ErrorCode;
use crate::local::CommandCallback;
use crate::message::{CommandMessage, CommandResult};
use crate::routing::{PriorityCalculator, RoutingStrategy};

pub(crate) struct CommandDispatcher {
    connections: Arc<dyn ConnectionManager>,
    codec: CommandCodec,
    metadata: CallMetadata,
    routing_strategy: Arc<dyn RoutingStrategy>,
    priority_calculator: Arc<dyn PriorityCalculator>,
    client_id: String,
}

impl CommandDispatcher {
    pub(crate) fn new(
        connections: Arc<dyn ConnectionManager>,
        codec: CommandCodec,
        metadata: CallMetadata,
        routing_strategy: Arc<dyn RoutingStrategy>,
        priority_calculator: Arc<dyn PriorityCalculator>,
        client_id: String,
    ) -> Self {
        Self {
            connections,
            codec,
            metadata,
            routing_strategy,
            priority_calculator,
            client_id,
        }
    }

    /// Non-blocking: returns once the call is handed to the transport. The
    /// callback fires later on a transport-owned task.
    pub(crate) fn dispatch(&self, command: CommandMessage, callback: CommandCallback) {
        debug!(command = %command.name(), "dispatching command to the router");
        let routing_key = self.routing_strategy.routing_key(&command);
        let priority = self.priority_calculator.priority(&command);
        let wire = match self.codec.encode_command(&command, &routing_key, priority) {
            Ok(wire) => wire,
            Err(err) => return self.fail_dispatch(command, callback, &err),
        };
        let channel = match self.connections.channel() {
            Ok(channel) => channel,
            Err(err) => return self.fail_dispatch(command, callback, &err),
        };
        let observer = DispatchObserver {
            command,
            callback: Some(callback),
            codec: self.codec.clone(),
            client_id: self.client_id.clone(),
            server_responded: false,
        };
        channel.dispatch(wire, self.metadata.clone(), Box::new(observer));
    }

    fn fail_dispatch(
        &self,
        command: CommandMessage,
        callback: CommandCallback,
        cause: &dyn std::fmt::Display,
    ) {
        warn!(
            command = %command.name(),
            error = %cause,
            "there was a problem dispatching the command"
        );
        metrics::counter!("courier_client_dispatch_failures_total").increment(1);
        let result = CommandResult::exceptional(
            ErrorCode::CommandDispatchError.convert(&self.client_id, cause),
        );
        callback(&command, result);
    }
}

struct DispatchObserver {
    command: CommandMessage,
    callback: Option<CommandCallback>,
    codec: CommandCodec,
    client_id: String,
    server_responded: bool,
}

impl DispatchObserver {
    fn complete(&mut self, result: CommandResult) {
        // Once-only: a misbehaving transport cannot double-invoke the caller.
        if let Some(callback) = self.callback.take() {
            callback(&self.command, result);
        }
    }
}

impl ResponseObserver for DispatchObserver {
    fn on_next(&mut self, response: WireCommandResponse) {
        self.server_responded = true;
        debug!(request_id = %response.request_id, "received command response");
        let result = self.codec.decode_result(&response);
        self.complete(result);
    }

    fn on_error(&mut self, error: StreamError) {
        self.server_responded = true;
        self.complete(CommandResult::exceptional(
            ErrorCode::CommandDispatchError.convert(&self.client_id, &error),
        ));
    }

    fn on_completed(&mut self) {
        if !self.server_responded {
            self.complete(CommandResult::exceptional(
                ErrorCode::CommandDispatchError
                    .convert(&self.client_id, &"No result from command executor"),
            ));
        }
    }
}
