//! Pass events.
//!
//! A pass reports the buffer after every applied splice and once more when it
//! ends. Sinks receive events by value; closures, `Vec`s and `std` channels
//! all work as sinks.

use std::sync::mpsc;

use serde::Serialize;
use tracing::debug;

use crate::generation::{Task, UsageRecord};

/// Progress of a running pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PassEvent {
    /// The buffer after a splice was applied.
    Intermediate { task: Task, buffer: String },
    /// The pass finished or was cut short.
    Final {
        task: Task,
        buffer: String,
        usage: Vec<UsageRecord>,
        aborted: bool,
    },
}

impl PassEvent {
    pub fn task(&self) -> Task {
        match self {
            PassEvent::Intermediate { task, .. } | PassEvent::Final { task, .. } => *task,
        }
    }

    pub fn buffer(&self) -> &str {
        match self {
            PassEvent::Intermediate { buffer, .. } | PassEvent::Final { buffer, .. } => buffer,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, PassEvent::Final { .. })
    }
}

/// Receives pass events.
pub trait EventSink {
    fn emit(&mut self, event: PassEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: PassEvent) {}
}

impl EventSink for Vec<PassEvent> {
    fn emit(&mut self, event: PassEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::Sender<PassEvent> {
    fn emit(&mut self, event: PassEvent) {
        if self.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

impl<F> EventSink for F
where
    F: FnMut(PassEvent),
{
    fn emit(&mut self, event: PassEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_tagged() {
        let event = PassEvent::Intermediate {
            task: Task::Comments,
            buffer: "x\n".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "intermediate", "task": "comments", "buffer": "x\n"})
        );
    }

    #[test]
    fn channel_and_closure_sinks() {
        let (tx, rx) = mpsc::channel();
        let mut sink = tx;
        sink.emit(PassEvent::Final {
            task: Task::Docstrings,
            buffer: String::new(),
            usage: Vec::new(),
            aborted: true,
        });
        let event = rx.recv().unwrap();
        assert!(event.is_final());
        assert_eq!(event.task(), Task::Docstrings);

        let mut count = 0;
        let mut counter = |_: PassEvent| count += 1;
        counter.emit(event);
        assert_eq!(count, 1);
    }
}
