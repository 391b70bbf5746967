//! Inbound message sink.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::Result;

/// Receiver for payloads decoded from client frames.
///
/// Called synchronously on the connection's task with exactly the bytes
/// received. Errors are logged by the caller and do not close the
/// connection.
pub trait MessageSink: Send + Sync {
    /// Handle one inbound payload.
    fn on_message(&self, payload: &[u8]) -> Result<()>;
}

impl<F> MessageSink for F
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync,
{
    fn on_message(&self, payload: &[u8]) -> Result<()> {
        self(payload)
    }
}

/// Replaceable holder for the current sink.
///
/// Replacing the sink while connections are active is best-effort: a
/// dispatch already in flight finishes on the previous sink.
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<Option<Arc<dyn MessageSink>>>>,
}

impl SinkSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a sink, replacing any previous one.
    pub fn set(&self, sink: Arc<dyn MessageSink>) {
        let mut slot = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(sink);
    }

    /// Remove the current sink.
    pub fn clear(&self) {
        let mut slot = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }

    /// Get the current sink, if any.
    pub fn current(&self) -> Option<Arc<dyn MessageSink>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Hand `payload` to the current sink.
    ///
    /// Returns `false` if no sink is installed, the sink failed or it
    /// panicked; all failures are logged here.
    pub fn dispatch(&self, payload: &[u8]) -> bool {
        let Some(sink) = self.current() else {
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| sink.on_message(payload))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Error in message sink: {}", e);
                false
            }
            Err(panic_payload) => {
                error!(
                    "Message sink panicked: {}",
                    panic_message(panic_payload.as_ref())
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
