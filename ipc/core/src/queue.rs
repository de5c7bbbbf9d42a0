//! Outbound Write Queue
//!
//! Shared FIFO of pending payloads used by both the Connector and the
//! Listener. Payloads are transmitted strictly in the order enqueued; they are
//! dropped only on connection teardown (Listener) or queue overflow.
//!
//! Each entry may carry a completion that the owner fires once the payload has
//! been fully handed to the transport — or immediately, when delivery turns
//! out to be impossible, so callers are never left hanging.

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// A queued payload and its optional flush completion.
#[derive(Debug)]
pub(crate) struct Outbound {
    /// Opaque bytes to transmit.
    pub(crate) payload: Vec<u8>,
    /// Fired when the payload has been flushed (or abandoned).
    pub(crate) done: Option<oneshot::Sender<()>>,
}

impl Outbound {
    /// Fire the completion, if any. The receiver may already be gone.
    pub(crate) fn complete(self) {
        if let Some(done) = self.done {
            let _ = done.send(());
        }
    }
}

/// Bounded FIFO of outbound payloads with drop-oldest overflow.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    items: VecDeque<Outbound>,
    max: usize,
}

impl OutboundQueue {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max,
        }
    }

    /// Enqueue at the tail. If the queue is full, the oldest entry is dropped
    /// (its completion fires) so the freshest data keeps flowing.
    pub(crate) fn push(&mut self, payload: Vec<u8>, done: Option<oneshot::Sender<()>>) {
        if self.items.len() >= self.max {
            if let Some(oldest) = self.items.pop_front() {
                tracing::warn!(
                    queued = self.items.len(),
                    "outbound queue full, dropping oldest payload"
                );
                oldest.complete();
            }
        }
        self.items.push_back(Outbound { payload, done });
    }

    /// Dequeue the next payload to transmit.
    pub(crate) fn pop(&mut self) -> Option<Outbound> {
        self.items.pop_front()
    }

    /// Drop everything, firing all pending completions.
    ///
    /// Used on connection teardown when the queued payloads can no longer be
    /// delivered.
    pub(crate) fn abandon(&mut self) {
        if !self.items.is_empty() {
            tracing::warn!(dropped = self.items.len(), "abandoning queued payloads");
        }
        for item in self.items.drain(..) {
            item.complete();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fifo_order() {
        let mut q = OutboundQueue::new(16);
        q.push(b"p1".to_vec(), None);
        q.push(b"p2".to_vec(), None);
        q.push(b"p3".to_vec(), None);

        assert_eq!(q.pop().unwrap().payload, b"p1");
        assert_eq!(q.pop().unwrap().payload, b"p2");
        assert_eq!(q.pop().unwrap().payload, b"p3");
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut q = OutboundQueue::new(2);
        q.push(b"a".to_vec(), None);
        q.push(b"b".to_vec(), None);
        q.push(b"c".to_vec(), None);

        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().payload, b"b");
        assert_eq!(q.pop().unwrap().payload, b"c");
    }

    #[test]
    fn test_overflow_fires_displaced_completion() {
        let mut q = OutboundQueue::new(1);
        let (tx, mut rx) = oneshot::channel();
        q.push(b"old".to_vec(), Some(tx));
        q.push(b"new".to_vec(), None);

        assert!(matches!(rx.try_recv(), Ok(())));
    }

    #[test]
    fn test_abandon_fires_all_completions() {
        let mut q = OutboundQueue::new(8);
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        q.push(b"a".to_vec(), Some(tx1));
        q.push(b"b".to_vec(), Some(tx2));

        q.abandon();
        assert!(q.is_empty());
        assert!(matches!(rx1.try_recv(), Ok(())));
        assert!(matches!(rx2.try_recv(), Ok(())));
    }
}
