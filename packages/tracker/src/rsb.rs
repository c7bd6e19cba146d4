//! # Remote Sync Queue
//!
//! Each command accumulates the structural operations it performed while it
//! was applied. Once the command's save is confirmed the queue is flushed to
//! the [`RemoteSync`] collaborator; on rollback or revert it is dropped
//! without sending anything.
//!
//! Queue entries are opaque to the tracker. Only the sync collaborator gives
//! them meaning.

use crate::remote::RemoteSync;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One outbound remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOp {
    pub action: String,
    #[serde(default)]
    pub undo: bool,
    pub args: Vec<Value>,
}

impl RemoteOp {
    pub fn new(action: impl Into<String>, undo: bool, args: Vec<Value>) -> Self {
        Self {
            action: action.into(),
            undo,
            args,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteQueue {
    ops: Vec<RemoteOp>,
}

impl RemoteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, op: RemoteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteOp> {
        self.ops.iter()
    }

    /// Flush every op to `sink` for `model` (the default endpoint when `None`).
    ///
    /// Without a sink there is nobody to deliver to and the queue is simply
    /// emptied.
    pub fn process(&mut self, model: Option<&str>, sink: Option<&mut (dyn RemoteSync + 'static)>) -> usize {
        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        if count == 0 {
            return 0;
        }
        match sink {
            Some(sink) => {
                debug!(model = model.unwrap_or("<default>"), ops = count, "Flushing remote queue");
                sink.process_queue(model, ops);
            }
            None => debug!(ops = count, "No remote sync configured, dropping queue"),
        }
        count
    }

    /// Drop all ops without sending
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        sent: Vec<(Option<String>, Vec<RemoteOp>)>,
    }

    impl RemoteSync for Collect {
        fn process_queue(&mut self, model: Option<&str>, ops: Vec<RemoteOp>) {
            self.sent.push((model.map(String::from), ops));
        }
    }

    #[test]
    fn test_process_flushes_to_bound_model() {
        let mut queue = RemoteQueue::new();
        queue.enqueue(RemoteOp::new("setProperty", false, vec![Value::from("/a[1]")]));
        queue.enqueue(RemoteOp::new("remove", false, vec![Value::from("/b[1]")]));

        let mut sink = Collect::default();
        let sent = queue.process(Some("books"), Some(&mut sink));

        assert_eq!(sent, 2);
        assert!(queue.is_empty());
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].0.as_deref(), Some("books"));
        assert_eq!(sink.sent[0].1.len(), 2);
    }

    #[test]
    fn test_empty_queue_sends_nothing() {
        let mut queue = RemoteQueue::new();
        let mut sink = Collect::default();
        assert_eq!(queue.process(None, Some(&mut sink)), 0);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_clear_drops_without_sending() {
        let mut queue = RemoteQueue::new();
        queue.enqueue(RemoteOp::new("insert", false, vec![]));
        queue.clear();

        let mut sink = Collect::default();
        queue.process(None, Some(&mut sink));
        assert!(sink.sent.is_empty());
    }
}
