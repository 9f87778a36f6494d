//! The ordered structure over pending [`Request`]s.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::Error;
use crate::request::Request;

/// Keyed on `(priority desc, seq asc)`: a `BinaryHeap` is a max-heap, and
/// `Request`'s `Ord` impl already orders higher priority and lower `seq`
/// first, so the heap's max is always the request that should run next.
pub(crate) struct PriorityQueue {
    seq: AtomicU64,
    heap: Mutex<BinaryHeap<Request>>,
    ready: event_listener::Event,
    closed: AtomicBool,
}

impl PriorityQueue {
    pub(crate) fn new() -> Self {
        PriorityQueue {
            seq: AtomicU64::new(0),
            heap: Mutex::new(BinaryHeap::new()),
            ready: event_listener::Event::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of requests currently waiting to be dispatched.
    pub(crate) fn len(&self) -> usize {
        self.heap.lock().expect("queue mutex poisoned").len()
    }

    /// Pushes a request, or — if the queue has already been closed — fails
    /// it with `Shutdown` on the spot instead of enqueueing it.
    ///
    /// Closing and pushing share the same lock (see [`close`](Self::close)),
    /// so there is no window in which a push can land in the heap after
    /// `close()` has already drained it: either this sees `closed == false`
    /// and inserts before `close()` can run, or `close()` has already set
    /// `closed` and this never inserts at all. A request can therefore never
    /// be silently orphaned — it is always either dispatched or resolved
    /// with `Shutdown`.
    pub(crate) fn push(&self, request: Request) {
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        if self.closed.load(Ordering::Acquire) {
            drop(heap);
            let _ = request.reply.send(Err(Error::Shutdown));
            return;
        }
        heap.push(request);
        drop(heap);
        self.ready.notify(1);
    }

    /// Blocks until a request is available or the queue is closed.
    ///
    /// Returns `None` as the shutdown sentinel once the queue has been
    /// closed and drained; workers seeing `None` exit their loop.
    pub(crate) async fn pop_highest(&self) -> Option<Request> {
        loop {
            // Register for notification before checking state, so a push or
            // close between the check and the listen can't be missed.
            let listener = self.ready.listen();

            if let Some(request) = self.heap.lock().expect("queue mutex poisoned").pop() {
                return Some(request);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            listener.await;
        }
    }

    /// Marks the queue closed, drains whatever is still pending and fails
    /// each with `Shutdown`, then wakes every blocked worker so they can
    /// observe the shutdown sentinel.
    ///
    /// Closing and pushing share the same lock, so this drain catches every
    /// request that won any race with a concurrent `push` — a push that
    /// loses the race never inserts at all (it self-rejects, see
    /// [`push`](Self::push)), so nothing pushed before or after this call
    /// can be left in the heap unresolved.
    pub(crate) fn close(&self) {
        let drained: Vec<Request> = {
            let mut heap = self.heap.lock().expect("queue mutex poisoned");
            self.closed.store(true, Ordering::Release);
            heap.drain().collect()
        };
        for request in drained {
            let _ = request.reply.send(Err(Error::Shutdown));
        }
        self.ready.notify(usize::MAX);
    }
}
