//! Owner-thread dispatcher
//!
//! Marshals work from transport threads onto the thread that owns the
//! engine. Actions dispatched on the owner thread run immediately; actions
//! from any other thread are queued until the owner calls
//! [`Dispatcher::drain`].

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};

use tangible_core::EngineError;

type Action = Box<dyn FnOnce() + Send>;

/// Called when a dispatched action panics
pub type DispatchErrorHandler = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// Runs actions on the thread that created it
pub struct Dispatcher {
    owner: ThreadId,
    queue: Mutex<VecDeque<Action>>,
    error_handlers: RwLock<Vec<DispatchErrorHandler>>,
}

impl Dispatcher {
    /// Create a dispatcher owned by the calling thread
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
            error_handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run `action` now if called on the owner thread, otherwise queue it
    pub fn dispatch<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owner_thread() {
            self.run(Box::new(action));
        } else {
            self.queue.lock().push_back(Box::new(action));
        }
    }

    /// Run the actions queued so far, in order
    ///
    /// Actions queued while draining wait for the next call. Returns the
    /// number of actions run. Only the owner thread may drain.
    pub fn drain(&self) -> usize {
        if !self.is_owner_thread() {
            warn!("Dispatcher drained from a foreign thread, ignoring");
            return 0;
        }

        let budget = self.queue.lock().len();
        let mut ran = 0;
        while ran < budget {
            let Some(action) = self.queue.lock().pop_front() else {
                break;
            };
            self.run(action);
            ran += 1;
        }
        ran
    }

    /// Number of queued actions
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Register a handler for panicking actions
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&EngineError) + Send + Sync + 'static,
    {
        self.error_handlers.write().push(Arc::new(handler));
    }

    fn run(&self, action: Action) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
            let err = EngineError::ActionPanicked(panic_message(payload.as_ref()));
            error!(error = %err, "Dispatched action failed");

            let handlers = self.error_handlers.read().clone();
            for handler in handlers {
                handler(&err);
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("owner", &self.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
