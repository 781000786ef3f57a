//! Local command bus seam and a simple in-process implementation.
//!
//! The connector delegates actual handler execution to a [`LocalCommandBus`];
//! [`SimpleCommandBus`] is the reference implementation used in tests and in
//! deployments that keep handlers in the same process.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::CommandError;
use crate::message::{CommandMessage, CommandResult};
use crate::registration::Registration;

/// Completion callback for a dispatched command. Invoked exactly once.
pub type CommandCallback = Box<dyn FnOnce(&CommandMessage, CommandResult) + Send>;

/// Application handler for a named command.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, message: &CommandMessage) -> Result<serde_json::Value, CommandError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandMessage) -> Result<serde_json::Value, CommandError> + Send + Sync,
{
    fn handle(&self, message: &CommandMessage) -> Result<serde_json::Value, CommandError> {
        self(message)
    }
}

/// Wrapper around local handler invocation; may rewrite the message or abort
/// handling with an error.
pub trait HandlerInterceptor: Send + Sync {
    fn intercept(&self, message: &mut CommandMessage) -> Result<(), CommandError>;
}

impl<F> HandlerInterceptor for F
where
    F: Fn(&mut CommandMessage) -> Result<(), CommandError> + Send + Sync,
{
    fn intercept(&self, message: &mut CommandMessage) -> Result<(), CommandError> {
        self(message)
    }
}

/// In-process dispatcher running handlers registered by the application.
pub trait LocalCommandBus: Send + Sync {
    fn subscribe(&self, command_name: &str, handler: Arc<dyn CommandHandler>) -> Registration;
    fn dispatch(&self, message: CommandMessage, callback: CommandCallback);
    fn register_handler_interceptor(&self, interceptor: Arc<dyn HandlerInterceptor>)
    -> Registration;
}

/// Straightforward synchronous bus: one handler per command name, handler
/// interceptors applied in registration order before the handler runs.
#[derive(Default)]
pub struct SimpleCommandBus {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn CommandHandler>>>>,
    interceptors: Arc<RwLock<Vec<(u64, Arc<dyn HandlerInterceptor>)>>>,
    next_interceptor_id: AtomicU64,
}

impl SimpleCommandBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCommandBus for SimpleCommandBus {
    fn subscribe(&self, command_name: &str, handler: Arc<dyn CommandHandler>) -> Registration {
        self.handlers
            .write()
            .expect("handler lock")
            .insert(command_name.to_string(), Arc::clone(&handler));
        let handlers = Arc::clone(&self.handlers);
        let name = command_name.to_string();
        Registration::new(move || {
            let mut guard = handlers.write().expect("handler lock");
            // Only remove the handler this registration installed.
            if guard
                .get(&name)
                .is_some_and(|current| Arc::ptr_eq(current, &handler))
            {
                guard.remove(&name);
            }
        })
    }

    fn dispatch(&self, message: CommandMessage, callback: CommandCallback) {
        let interceptors: Vec<_> = self
            .interceptors
            .read()
            .expect("interceptor lock")
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect();
        let mut message = message;
        for interceptor in interceptors {
            if let Err(err) = interceptor.intercept(&mut message) {
                callback(&message, CommandResult::exceptional(err));
                return;
            }
        }
        let handler = self
            .handlers
            .read()
            .expect("handler lock")
            .get(message.name())
            .cloned();
        let Some(handler) = handler else {
            let err = CommandError::Execution(format!(
                "no handler registered for command [{}]",
                message.name()
            ));
            callback(&message, CommandResult::exceptional(err));
            return;
        };
        let result = match handler.handle(&message) {
            Ok(payload) => CommandResult::success(payload),
            Err(err) => CommandResult::exceptional(err),
        };
        callback(&message, result);
    }

    fn register_handler_interceptor(
        &self,
        interceptor: Arc<dyn HandlerInterceptor>,
    ) -> Registration {
        let id = self.next_interceptor_id.fetch_add(1, Ordering::Relaxed);
        self.interceptors
            .write()
            .expect("interceptor lock")
            .push((id, interceptor));
        let interceptors = Arc::clone(&self.interceptors);
        Registration::new(move || {
            interceptors
                .write()
                .expect("interceptor lock")
                .retain(|(entry_id, _)| *entry_id != id);
        })
    }
}
