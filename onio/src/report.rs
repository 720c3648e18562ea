//! Outcome of a successful dispatch.

use onio_core::ListenerFault;

/// Summary of one dispatch whose middleware chain completed.
///
/// Listener failures do not fail the dispatch; they are collected here.
#[derive(Debug)]
pub struct DispatchReport {
    event: String,
    invoked: usize,
    faults: Vec<ListenerFault>,
}

impl DispatchReport {
    pub(crate) fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            invoked: 0,
            faults: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: Result<(), ListenerFault>) {
        self.invoked += 1;
        if let Err(fault) = outcome {
            self.faults.push(fault);
        }
    }

    /// The dispatched event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Number of listeners invoked.
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    /// Number of listeners that completed without error.
    pub fn succeeded(&self) -> usize {
        self.invoked - self.faults.len()
    }

    /// Listener failures, in listener order.
    pub fn faults(&self) -> &[ListenerFault] {
        &self.faults
    }

    /// Consume the report and return the listener failures.
    pub fn into_faults(self) -> Vec<ListenerFault> {
        self.faults
    }

    /// Whether every listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}
