//! Event-sink interface for host integrations.
//!
//! A load generator drives the engine through three events. Anything that
//! wants to observe a run (the gate service, a JTL recorder) implements
//! [`RunListener`]; [`Fanout`] forwards events to several sinks.

use std::sync::Arc;

use livegate_core::Sample;

/// Receives run lifecycle events. Calls may arrive from many threads.
pub trait RunListener: Send + Sync {
    /// A request completed. Must not block or panic.
    fn on_sample(&self, sample: &Sample);

    fn on_run_start(&self);

    fn on_run_end(&self);
}

impl<T: RunListener + ?Sized> RunListener for Arc<T> {
    fn on_sample(&self, sample: &Sample) {
        (**self).on_sample(sample);
    }

    fn on_run_start(&self) {
        (**self).on_run_start();
    }

    fn on_run_end(&self) {
        (**self).on_run_end();
    }
}

/// Forwards every event to each listener, in registration order.
#[derive(Default)]
pub struct Fanout {
    listeners: Vec<Arc<dyn RunListener>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn RunListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl RunListener for Fanout {
    fn on_sample(&self, sample: &Sample) {
        for l in &self.listeners {
            l.on_sample(sample);
        }
    }

    fn on_run_start(&self) {
        for l in &self.listeners {
            l.on_run_start();
        }
    }

    fn on_run_end(&self) {
        for l in &self.listeners {
            l.on_run_end();
        }
    }
}
