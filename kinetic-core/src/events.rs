//! Player event hub.
//!
//! Explicit observer registration instead of implicit broadcast wiring:
//! components call `subscribe` with a handler, emitters call `emit`. Decoder
//! error callbacks are bound into this hub right after selection.

use parking_lot::Mutex;

use crate::source::StreamKind;

/// Player-level error events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// No candidate decoder opened for the stream kind. Emitted exactly
    /// once per failed selection, never per candidate.
    DecoderNotFound(StreamKind),
    /// Audio output could not be (re)opened after negotiation.
    DeviceOpenFailed,
    /// A live decoder reported a runtime error.
    DecodeError { kind: StreamKind, message: String },
}

type Handler = Box<dyn Fn(&PlayerEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventHub {
    handlers: Mutex<Vec<Handler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().push(Box::new(handler));
    }

    pub fn emit(&self, event: PlayerEvent) {
        for handler in self.handlers.lock().iter() {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_all_subscribers_see_event() {
        let hub = EventHub::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = seen.clone();
            hub.subscribe(move |event| {
                assert_eq!(*event, PlayerEvent::DeviceOpenFailed);
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        hub.emit(PlayerEvent::DeviceOpenFailed);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
