// In-process fake command router used by the integration tests.
//
// Implements the ConnectionManager seam: the subscriber stream is an mpsc
// pair whose client->server half is run through real frame encoding, and the
// unary dispatch channel is scripted off the command's metadata, mirroring
// the behavior the tests expect from a live router.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_client::connection::{
    CallMetadata, ConnectionError, ConnectionListener, ConnectionManager, DispatchChannel,
    OutboundItem, OutboundStream, ResponseObserver, StreamError, StreamObserver,
};
use courier_wire::{
    ClientMessage, ErrorEnvelope, SerializedPayload, ServerMessage, WireCommand,
    WireCommandResponse,
};

#[derive(Default)]
struct RouterState {
    active_subscriptions: Mutex<HashSet<String>>,
    subscribe_log: Mutex<Vec<String>>,
    flow_grants: Mutex<Vec<u64>>,
    responses: Mutex<Vec<WireCommandResponse>>,
    dispatched: Mutex<Vec<WireCommand>>,
    observer: Mutex<Option<Arc<dyn StreamObserver>>>,
    stream_metadata: Mutex<Option<CallMetadata>>,
    dispatch_metadata: Mutex<Option<CallMetadata>>,
    channel_failure: Mutex<Option<String>>,
    completed: Mutex<bool>,
    reconnect_listeners: Mutex<Vec<ConnectionListener>>,
    disconnect_listeners: Mutex<Vec<ConnectionListener>>,
}

#[derive(Default)]
pub struct FakeRouter {
    state: Arc<RouterState>,
}

impl FakeRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_channel(&self, message: &str) {
        *self.state.channel_failure.lock().expect("failure lock") = Some(message.to_string());
    }

    /// Deliver a command to the client as the router would.
    pub fn push_command(&self, command: WireCommand) {
        let observer = self
            .state
            .observer
            .lock()
            .expect("observer lock")
            .as_ref()
            .map(Arc::clone)
            .expect("no open command stream");
        observer.on_next(ServerMessage::Command(command));
    }

    /// Terminate the current stream with an error, as seen by the client.
    pub fn fail_stream(&self, error: StreamError) {
        let observer = self.state.observer.lock().expect("observer lock").take();
        if let Some(observer) = observer {
            observer.on_error(error);
        }
    }

    pub fn trigger_reconnect(&self) {
        let listeners: Vec<_> = self
            .state
            .reconnect_listeners
            .lock()
            .expect("listener lock")
            .clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn trigger_disconnect(&self) {
        let listeners: Vec<_> = self
            .state
            .disconnect_listeners
            .lock()
            .expect("listener lock")
            .clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn active_subscriptions(&self) -> HashSet<String> {
        self.state
            .active_subscriptions
            .lock()
            .expect("subscription lock")
            .clone()
    }

    /// How many SUBSCRIBE messages have been observed for `name`, including
    /// replays.
    pub fn subscribe_events(&self, name: &str) -> usize {
        self.state
            .subscribe_log
            .lock()
            .expect("log lock")
            .iter()
            .filter(|entry| entry.as_str() == name)
            .count()
    }

    pub fn flow_grants(&self) -> Vec<u64> {
        self.state.flow_grants.lock().expect("grant lock").clone()
    }

    pub fn responses(&self) -> Vec<WireCommandResponse> {
        self.state.responses.lock().expect("response lock").clone()
    }

    pub fn dispatched(&self) -> Vec<WireCommand> {
        self.state.dispatched.lock().expect("dispatch lock").clone()
    }

    pub fn stream_metadata(&self) -> Option<CallMetadata> {
        self.state
            .stream_metadata
            .lock()
            .expect("metadata lock")
            .clone()
    }

    pub fn dispatch_metadata(&self) -> Option<CallMetadata> {
        self.state
            .dispatch_metadata
            .lock()
            .expect("metadata lock")
            .clone()
    }

    pub fn stream_completed(&self) -> bool {
        *self.state.completed.lock().expect("completed lock")
    }
}

impl ConnectionManager for FakeRouter {
    fn channel(&self) -> Result<Arc<dyn DispatchChannel>, ConnectionError> {
        if let Some(message) = self
            .state
            .channel_failure
            .lock()
            .expect("failure lock")
            .clone()
        {
            return Err(ConnectionError::Internal(message));
        }
        Ok(Arc::new(FakeChannel {
            state: Arc::clone(&self.state),
        }))
    }

    fn open_command_stream(
        &self,
        observer: Arc<dyn StreamObserver>,
        metadata: &CallMetadata,
    ) -> Result<OutboundStream, ConnectionError> {
        *self.state.observer.lock().expect("observer lock") = Some(observer);
        *self.state.stream_metadata.lock().expect("metadata lock") = Some(metadata.clone());
        let (stream, mut rx) = OutboundStream::new();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    OutboundItem::Message(message) => {
                        // Round-trip through the frame layer the way a real
                        // transport would put it on the wire.
                        let frame = message.encode().expect("encode client message");
                        let message = ClientMessage::decode(&frame).expect("decode client message");
                        record(&state, message);
                    }
                    OutboundItem::Complete => {
                        *state.completed.lock().expect("completed lock") = true;
                        break;
                    }
                }
            }
        });
        Ok(stream)
    }

    fn add_reconnect_listener(&self, listener: ConnectionListener) {
        self.state
            .reconnect_listeners
            .lock()
            .expect("listener lock")
            .push(listener);
    }

    fn add_disconnect_listener(&self, listener: ConnectionListener) {
        self.state
            .disconnect_listeners
            .lock()
            .expect("listener lock")
            .push(listener);
    }
}

fn record(state: &RouterState, message: ClientMessage) {
    match message {
        ClientMessage::Subscribe(subscription) => {
            state
                .subscribe_log
                .lock()
                .expect("log lock")
                .push(subscription.command_name.clone());
            state
                .active_subscriptions
                .lock()
                .expect("subscription lock")
                .insert(subscription.command_name);
        }
        ClientMessage::Unsubscribe(subscription) => {
            state
                .active_subscriptions
                .lock()
                .expect("subscription lock")
                .remove(&subscription.command_name);
        }
        ClientMessage::CommandResponse(response) => {
            state
                .responses
                .lock()
                .expect("response lock")
                .push(response);
        }
        ClientMessage::FlowControl { permits } => {
            state.flow_grants.lock().expect("grant lock").push(permits);
        }
    }
}

struct FakeChannel {
    state: Arc<RouterState>,
}

impl DispatchChannel for FakeChannel {
    fn dispatch(
        &self,
        command: WireCommand,
        metadata: CallMetadata,
        mut observer: Box<dyn ResponseObserver>,
    ) {
        *self.state.dispatch_metadata.lock().expect("metadata lock") = Some(metadata);
        self.state
            .dispatched
            .lock()
            .expect("dispatch lock")
            .push(command.clone());
        if let Some(code) = command.metadata.get("errorCode").and_then(|v| v.as_str()) {
            observer.on_next(WireCommandResponse {
                message_id: "router-reply".to_string(),
                request_id: command.message_id,
                payload: None,
                error_code: Some(code.to_string()),
                error_message: Some(ErrorEnvelope {
                    message: "scripted failure".to_string(),
                    location: "router".to_string(),
                    details: Vec::new(),
                }),
            });
        } else if command.metadata.contains_key("noResponse") {
            // Fall through to the bare completion below.
        } else {
            observer.on_next(WireCommandResponse {
                message_id: "router-reply".to_string(),
                request_id: command.message_id,
                payload: Some(SerializedPayload {
                    type_name: "json".to_string(),
                    revision: String::new(),
                    data: br#""test""#.to_vec(),
                }),
                error_code: None,
                error_message: None,
            });
        }
        observer.on_completed();
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn assert_within(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
