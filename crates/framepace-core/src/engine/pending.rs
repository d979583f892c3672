use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::watch;

/// Observer of the pending-task count.
pub trait PendingCountSink {
    fn publish(&self, pending: usize);

    fn complete(&self);
}

/// Publishes registry size to a watch channel and any registered sinks.
/// Consecutive identical values are collapsed.
pub(crate) struct PendingCounter {
    inner: RefCell<PendingState>,
}

struct PendingState {
    sender: Option<watch::Sender<usize>>,
    sinks: Vec<Rc<dyn PendingCountSink>>,
    last: usize,
}

impl PendingCounter {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            inner: RefCell::new(PendingState {
                sender: Some(sender),
                sinks: Vec::new(),
                last: 0,
            }),
        }
    }

    pub(crate) fn publish(&self, pending: usize) {
        let sinks = {
            let mut state = self.inner.borrow_mut();
            let Some(sender) = &state.sender else {
                return;
            };
            if state.last == pending {
                return;
            }
            sender.send_replace(pending);
            state.last = pending;
            state.sinks.clone()
        };
        for sink in sinks {
            sink.publish(pending);
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<usize> {
        let state = self.inner.borrow();
        match &state.sender {
            Some(sender) => sender.subscribe(),
            None => watch::channel(state.last).1,
        }
    }

    /// New sinks immediately receive the current value.
    pub(crate) fn add_sink(&self, sink: Rc<dyn PendingCountSink>) {
        let current = {
            let mut state = self.inner.borrow_mut();
            if state.sender.is_none() {
                drop(state);
                sink.complete();
                return;
            }
            state.sinks.push(sink.clone());
            state.last
        };
        sink.publish(current);
    }

    pub(crate) fn complete(&self) {
        let sinks = {
            let mut state = self.inner.borrow_mut();
            if state.sender.take().is_none() {
                return;
            }
            std::mem::take(&mut state.sinks)
        };
        for sink in sinks {
            sink.complete();
        }
    }
}
