// Cancellable registration handles returned by subscribe operations.
use std::sync::Mutex;

/// Handle that undoes a subscription or interceptor registration. Cancelling
/// more than once is a no-op.
pub struct Registration {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Registration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn cancel(&self) {
        let callback = self.cancel.lock().expect("registration lock").take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cancel_runs_the_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = Registration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.cancel();
        registration.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
