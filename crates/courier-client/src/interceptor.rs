// Dispatch interceptor chain applied before outbound encoding.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::message::CommandMessage;
use crate::registration::Registration;

/// Pure transformer applied to every outbound command, in registration order.
pub trait DispatchInterceptor: Send + Sync {
    fn intercept(&self, message: CommandMessage) -> CommandMessage;
}

impl<F> DispatchInterceptor for F
where
    F: Fn(CommandMessage) -> CommandMessage + Send + Sync,
{
    fn intercept(&self, message: CommandMessage) -> CommandMessage {
        self(message)
    }
}

#[derive(Default)]
pub(crate) struct DispatchInterceptors {
    chain: Mutex<Vec<(u64, Arc<dyn DispatchInterceptor>)>>,
    next_id: AtomicU64,
}

impl DispatchInterceptors {
    pub(crate) fn register(
        self: &Arc<Self>,
        interceptor: Arc<dyn DispatchInterceptor>,
    ) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.chain
            .lock()
            .expect("interceptor lock")
            .push((id, interceptor));
        let chain = Arc::clone(self);
        Registration::new(move || {
            chain
                .chain
                .lock()
                .expect("interceptor lock")
                .retain(|(entry_id, _)| *entry_id != id);
        })
    }

    pub(crate) fn intercept(&self, mut message: CommandMessage) -> CommandMessage {
        let interceptors: Vec<_> = self
            .chain
            .lock()
            .expect("interceptor lock")
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect();
        for interceptor in interceptors {
            message = interceptor.intercept(message);
        }
        message
    }
}
