//! Command router subscription registry, inbound stream lifecycle, and the
//! worker pool draining the inbound queue.
//!
//! # Purpose
//! Keeps the router's view of this client's subscriptions converged with the
//! local registry across stream failures and reconnects, and turns inbound
//! commands into local handler invocations whose results flow back on the
//! same stream.
//!
//! # Design notes
//! The stream handle is created lazily under a single lock; the initial
//! permit grant happens inside that critical section so no user of the
//! handle ever sees a stream without credit. Stream errors clear the handle
//! and replay the registry unless the transport reports the peer as
//! unavailable, in which case the connection manager owns recovery.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courier_wire::{ClientMessage, CommandSubscription, ServerMessage, WireCommand};

use crate::codec::CommandCodec;
use crate::config::{QUEUE_INITIAL_CAPACITY, RouterConfig, WORKER_POLL_INTERVAL};
use crate::connection::{
    CallMetadata, ConnectionError, ConnectionManager, StreamError, StreamObserver,
};
use crate::error::ErrorCode;
use crate::flow::FlowControlledStream;
use crate::local::LocalCommandBus;
use crate::message::CommandMessage;
use crate::queue::PriorityQueue;

pub(crate) struct RouterSubscriber {
    config: RouterConfig,
    connections: Arc<dyn ConnectionManager>,
    local_bus: Arc<dyn LocalCommandBus>,
    codec: CommandCodec,
    metadata: CallMetadata,
    queue: PriorityQueue<WireCommand>,
    subscriptions: RwLock<HashSet<String>>,
    /// Hint to skip a resubscribe racing an in-flight subscribe call.
    subscribing: AtomicBool,
    running: AtomicBool,
    stream: Mutex<Option<Arc<FlowControlledStream>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RouterSubscriber {
    pub(crate) fn new(
        config: RouterConfig,
        connections: Arc<dyn ConnectionManager>,
        local_bus: Arc<dyn LocalCommandBus>,
        codec: CommandCodec,
        metadata: CallMetadata,
    ) -> Arc<Self> {
        let subscriber = Arc::new(Self {
            queue: PriorityQueue::new(QUEUE_INITIAL_CAPACITY),
            subscriptions: RwLock::new(HashSet::new()),
            subscribing: AtomicBool::new(false),
            running: AtomicBool::new(true),
            stream: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            config,
            connections,
            local_bus,
            codec,
            metadata,
        });
        subscriber.install_listeners();
        subscriber.start_workers();
        subscriber
    }

    fn install_listeners(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.connections.add_reconnect_listener(Arc::new(move || {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.resubscribe();
            }
        }));
        let weak = Arc::downgrade(self);
        self.connections.add_disconnect_listener(Arc::new(move || {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.unsubscribe_all();
            }
        }));
    }

    fn start_workers(self: &Arc<Self>) {
        let mut workers = self.workers.lock().expect("worker lock");
        for _ in 0..self.config.command_threads {
            let subscriber = Arc::clone(self);
            workers.push(tokio::spawn(run_worker(subscriber)));
        }
    }

    fn subscription(&self, command_name: &str, with_component: bool) -> CommandSubscription {
        CommandSubscription {
            command_name: command_name.to_string(),
            client_id: self.config.client_id.clone(),
            component_name: if with_component {
                self.config.component_name.clone()
            } else {
                String::new()
            },
            message_id: Uuid::new_v4().to_string(),
        }
    }

    pub(crate) fn subscribe(self: &Arc<Self>, command_name: &str) {
        self.subscribing.store(true, Ordering::SeqCst);
        self.subscriptions
            .write()
            .expect("subscription lock")
            .insert(command_name.to_string());
        let result = self.subscriber_stream().and_then(|stream| {
            stream.send(ClientMessage::Subscribe(
                self.subscription(command_name, true),
            ))
        });
        self.subscribing.store(false, Ordering::SeqCst);
        if let Err(err) = result {
            // The name stays registered; drop the dead stream handle and
            // replay the registry right away rather than waiting for the
            // next reconnect.
            debug!(
                command = command_name,
                error = %err,
                "subscribing command failed; replaying registered subscriptions"
            );
            self.clear_stream();
            self.resubscribe();
        }
    }

    pub(crate) fn unsubscribe(self: &Arc<Self>, command_name: &str) {
        self.subscriptions
            .write()
            .expect("subscription lock")
            .remove(command_name);
        if let Ok(stream) = self.subscriber_stream() {
            let _ = stream.send(ClientMessage::Unsubscribe(
                self.subscription(command_name, false),
            ));
        }
    }

    /// Replay every registered subscription on the current stream. Invoked by
    /// the connection manager after each successful (re)connect.
    pub(crate) fn resubscribe(self: &Arc<Self>) {
        let names: Vec<String> = self
            .subscriptions
            .read()
            .expect("subscription lock")
            .iter()
            .cloned()
            .collect();
        if names.is_empty() || self.subscribing.load(Ordering::SeqCst) {
            return;
        }
        match self.subscriber_stream() {
            Ok(stream) => {
                for name in names {
                    if let Err(err) =
                        stream.send(ClientMessage::Subscribe(self.subscription(&name, true)))
                    {
                        warn!(command = %name, error = %err, "error while resubscribing");
                        break;
                    }
                }
            }
            Err(err) => warn!(error = %err, "error while resubscribing"),
        }
    }

    /// Best-effort unsubscribe of every registered name; the registry itself
    /// is kept so a later reconnect replays it. Invoked on disconnect
    /// notifications.
    pub(crate) fn unsubscribe_all(self: &Arc<Self>) {
        let names: Vec<String> = self
            .subscriptions
            .read()
            .expect("subscription lock")
            .iter()
            .cloned()
            .collect();
        for name in names {
            if let Ok(stream) = self.subscriber_stream() {
                let _ = stream.send(ClientMessage::Unsubscribe(self.subscription(&name, false)));
            }
        }
        self.clear_stream();
    }

    fn subscriber_stream(self: &Arc<Self>) -> Result<Arc<FlowControlledStream>, ConnectionError> {
        let mut guard = self.stream.lock().expect("stream lock");
        if let Some(stream) = guard.as_ref() {
            return Ok(Arc::clone(stream));
        }
        let observer = Arc::new(SubscriberObserver {
            subscriber: Arc::downgrade(self),
        });
        let outbound = self
            .connections
            .open_command_stream(observer, &self.metadata)?;
        info!("creating new command subscriber stream");
        let stream = Arc::new(FlowControlledStream::new(
            outbound,
            self.config.initial_permits,
            self.config.new_permits,
            self.config.new_permits_threshold,
            |message| matches!(message, ClientMessage::CommandResponse(_)),
        ));
        stream.send_initial_permits()?;
        *guard = Some(Arc::clone(&stream));
        Ok(stream)
    }

    fn clear_stream(&self) {
        *self.stream.lock().expect("stream lock") = None;
    }

    pub(crate) fn enqueue(&self, command: WireCommand) {
        let priority = command.priority();
        self.queue.push(priority, command);
        metrics::gauge!("courier_client_command_queue_depth").set(self.queue.len() as f64);
    }

    fn process_command(self: &Arc<Self>, command: WireCommand) {
        let stream = match self.subscriber_stream() {
            Ok(stream) => stream,
            Err(err) => {
                error!(
                    command = %command.name,
                    error = %err,
                    "no outbound stream to respond on"
                );
                return;
            }
        };
        match self.codec.decode_command(&command) {
            Ok(message) => self.dispatch_local(message, stream),
            Err(err) => {
                error!(
                    command = %command.name,
                    error = %err,
                    "error while dispatching command"
                );
                let response = self.codec.error_response(
                    &command.message_id,
                    ErrorCode::CommandDispatchError,
                    &err,
                );
                if let Err(send_err) = stream.send(ClientMessage::CommandResponse(response)) {
                    warn!(error = %send_err, "failed to send dispatch error response");
                }
            }
        }
    }

    fn dispatch_local(&self, message: CommandMessage, stream: Arc<FlowControlledStream>) {
        debug!(command = %message.name(), "dispatching command locally");
        let codec = self.codec.clone();
        let request_id = message.identifier().to_string();
        self.local_bus.dispatch(
            message,
            Box::new(move |message: &CommandMessage, result: crate::message::CommandResult| {
                let response = if let Some(err) = result.exception() {
                    info!(
                        command = %message.name(),
                        error = %err,
                        "local command handling failed"
                    );
                    codec.error_response(&request_id, err.handler_error_code(), err)
                } else {
                    match codec.encode_result(&result, &request_id) {
                        Ok(response) => response,
                        Err(err) => {
                            codec.error_response(&request_id, ErrorCode::CommandDispatchError, &err)
                        }
                    }
                };
                if let Err(err) = stream.send(ClientMessage::CommandResponse(response)) {
                    warn!(error = %err, "failed to send command response");
                } else {
                    metrics::counter!("courier_client_command_responses_total").increment(1);
                }
            }),
        );
    }

    /// Half-close the stream, stop the workers, and let in-flight commands
    /// drain.
    pub(crate) async fn disconnect(&self) {
        if let Some(stream) = self.stream.lock().expect("stream lock").as_ref() {
            stream.complete();
        }
        self.running.store(false, Ordering::SeqCst);
        let workers = std::mem::take(&mut *self.workers.lock().expect("worker lock"));
        for worker in workers {
            let _ = worker.await;
        }
    }
}

struct SubscriberObserver {
    subscriber: Weak<RouterSubscriber>,
}

impl StreamObserver for SubscriberObserver {
    fn on_next(&self, message: ServerMessage) {
        let Some(subscriber) = self.subscriber.upgrade() else {
            return;
        };
        match message {
            ServerMessage::Command(command) => {
                debug!(command = %command.name, "received command from router");
                subscriber.enqueue(command);
            }
            // Other inbound kinds are not part of the command path.
            ServerMessage::Confirmation { .. } => {}
        }
    }

    fn on_error(&self, error: StreamError) {
        warn!(error = %error, "received error from router stream");
        let Some(subscriber) = self.subscriber.upgrade() else {
            return;
        };
        subscriber.clear_stream();
        if error.is_unavailable() {
            // The connection manager drives reconnection; resubscribing here
            // would race the dial.
            return;
        }
        subscriber.resubscribe();
    }

    fn on_completed(&self) {
        debug!("router stream completed");
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.clear_stream();
        }
    }
}

async fn run_worker(subscriber: Arc<RouterSubscriber>) {
    debug!("starting command worker");
    while subscriber.running.load(Ordering::SeqCst) {
        let Some(command) = subscriber.queue.poll(WORKER_POLL_INTERVAL).await else {
            continue;
        };
        metrics::counter!("courier_client_commands_received_total").increment(1);
        subscriber.process_command(command);
    }
    debug!("command worker stopped");
}
