use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::state::RequestState;

/// The process-wide submission queue.
pub(crate) static SUBMIT: SubmitQueue = SubmitQueue::new();

/// Unbounded FIFO connecting submitting threads to the engine.
///
/// Producers are arbitrary caller threads; the sole consumer is whichever
/// thread runs the engine tick. The condvar doubles as the engine's idle
/// wake-up when no transfer is active.
pub(crate) struct SubmitQueue {
    items: Mutex<VecDeque<Arc<RequestState>>>,
    ready: Condvar,
}

impl SubmitQueue {
    pub(crate) const fn new() -> Self {
        SubmitQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<RequestState>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, state: Arc<RequestState>) {
        self.lock().push_back(state);
        self.ready.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<RequestState>> {
        self.lock().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Block until at least one submission is queued, up to `timeout`.
    /// Returns whether the queue is non-empty.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Block until at least one submission is queued or `deadline` passes.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut items = self.lock();
        while items.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(items, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            items = guard;
        }
        true
    }

    /// Copy every queued state into `dst` without consuming the queue.
    pub(crate) fn snapshot_into(&self, dst: &mut Vec<Arc<RequestState>>) {
        dst.extend(self.lock().iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::request::RequestBuilder;

    fn state() -> Arc<RequestState> {
        RequestState::create(RequestBuilder::new("http://localhost/"))
    }

    #[test]
    fn fifo_order() {
        let queue = SubmitQueue::new();
        let (a, b) = (state(), state());
        queue.push(a.clone());
        queue.push(b.clone());
        assert!(Arc::ptr_eq(&queue.try_pop().unwrap(), &a));
        assert!(Arc::ptr_eq(&queue.try_pop().unwrap(), &b));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn snapshot_does_not_consume() {
        let queue = SubmitQueue::new();
        queue.push(state());
        queue.push(state());

        let mut seen = Vec::new();
        queue.snapshot_into(&mut seen);
        assert_eq!(seen.len(), 2);
        assert!(!queue.is_empty());
    }

    #[test]
    fn wait_for_times_out_when_empty() {
        let queue = SubmitQueue::new();
        assert!(!queue.wait_for(Duration::from_millis(20)));
    }

    #[test]
    fn wait_for_wakes_on_push() {
        let queue = Arc::new(SubmitQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(state());
            })
        };
        assert!(queue.wait_for(Duration::from_secs(5)));
        producer.join().unwrap();
    }
}
