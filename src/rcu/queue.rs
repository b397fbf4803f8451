// Lock-free intrusive MPSC queue based on Dmitry Vyukov's algorithm
// (1024cores.net).
//
// Producers enqueue with a single atomic exchange on the head pointer plus a
// release store on the predecessor's link, so the push path is wait-free.
// The single consumer dequeues lock-free, re-inserting the permanent sentinel
// node when it reaches the last element. FIFO order is the serialization
// order of the producers' exchanges on `head`.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Callback invoked once a grace period has elapsed.
pub type DeferredAction = Box<dyn FnOnce() + Send>;

/// A heap-owned unit of deferred reclamation work.
///
/// Ownership passes producer → queue → consumer → destructor: pushing hands
/// the box to the queue, popping hands it back.
pub struct DeferredWorkItem {
    /// Intrusive link. Written by producers (exchange), read by the consumer.
    next: AtomicPtr<DeferredWorkItem>,

    /// Grace-period token. The item may be invoked once the QSBR variable
    /// reports this token complete.
    pub token: u64,

    callback: Option<DeferredAction>,
}

impl DeferredWorkItem {
    pub fn new(token: u64, callback: DeferredAction) -> Box<Self> {
        Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            token,
            callback: Some(callback),
        })
    }

    /// Sentinel constructor; never carries a callback.
    fn sentinel() -> Box<Self> {
        Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            token: 0,
            callback: None,
        })
    }

    /// Run the callback. At most once.
    pub fn invoke(mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

/// Wait-free multi-producer single-consumer queue of deferred work items.
///
/// Thread safety:
///   `push()` is safe from any thread concurrently (wait-free).
///   `pop()` must only be called from the single consumer thread (the
///   control plane). `is_empty()` is approximate and consumer-only.
pub struct MpscQueue {
    /// Producers exchange here to enqueue.
    head: AtomicPtr<DeferredWorkItem>,

    /// Consumer-local; points at the next node to dequeue.
    tail: UnsafeCell<*mut DeferredWorkItem>,

    /// Permanent sentinel. Always reachable from `tail`.
    stub: Box<DeferredWorkItem>,
}

// SAFETY: `head` and the intrusive links are accessed with the orderings of
// Vyukov's algorithm; `tail` is documented consumer-only and never touched by
// producers. Nodes observed by the consumer become its exclusive property.
unsafe impl Send for MpscQueue {}
unsafe impl Sync for MpscQueue {}

impl MpscQueue {
    pub fn new() -> Self {
        let stub = DeferredWorkItem::sentinel();
        let stub_ptr = &*stub as *const DeferredWorkItem as *mut DeferredWorkItem;
        Self {
            head: AtomicPtr::new(stub_ptr),
            tail: UnsafeCell::new(stub_ptr),
            stub,
        }
    }

    fn stub_ptr(&self) -> *mut DeferredWorkItem {
        &*self.stub as *const DeferredWorkItem as *mut DeferredWorkItem
    }

    /// Enqueue a node. Wait-free; safe from any thread.
    pub fn push(&self, node: Box<DeferredWorkItem>) {
        self.push_raw(Box::into_raw(node));
    }

    fn push_raw(&self, node: *mut DeferredWorkItem) {
        // SAFETY: `node` is either a freshly leaked box or the sentinel; in
        // both cases this thread has exclusive access to `next` until the
        // release store below publishes it.
        unsafe {
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        }
        let prev = self.head.swap(node, Ordering::AcqRel);
        // SAFETY: `prev` stays alive until the consumer passes it, which
        // cannot happen before this store makes the link visible.
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
    }

    /// Dequeue a node. Single consumer only.
    ///
    /// May transiently return `None` while a producer's link-in is in flight
    /// even though the queue is non-empty; the consumer retries later.
    pub fn pop(&self) -> Option<Box<DeferredWorkItem>> {
        let stub = self.stub_ptr();

        // SAFETY: single-consumer contract; nothing else reads or writes
        // `tail`. Raw node derefs are valid because nodes are only freed
        // after the consumer takes ownership of them here.
        unsafe {
            let mut tail = *self.tail.get();
            let mut next = (*tail).next.load(Ordering::Acquire);

            if tail == stub {
                if next.is_null() {
                    return None; // Queue is empty.
                }
                *self.tail.get() = next; // Skip past the sentinel.
                tail = next;
                next = (*next).next.load(Ordering::Acquire);
            }

            if !next.is_null() {
                *self.tail.get() = next;
                return Some(Box::from_raw(tail));
            }

            // One node left. It may be the last producer's node whose link
            // has not been published yet.
            let head = self.head.load(Ordering::Acquire);
            if tail != head {
                return None; // Producer mid-link; retry later.
            }

            // Re-insert the sentinel so the last node can be dequeued.
            self.push_raw(stub);

            next = (*tail).next.load(Ordering::Acquire);
            if !next.is_null() {
                *self.tail.get() = next;
                return Some(Box::from_raw(tail));
            }

            None
        }
    }

    /// Whether the queue appears empty. Approximate: concurrent pushes can
    /// make this report `true` spuriously. Consumer only.
    pub fn is_empty(&self) -> bool {
        // SAFETY: single-consumer contract for `tail`.
        let tail = unsafe { *self.tail.get() };
        tail == self.stub_ptr() && self.stub.next.load(Ordering::Acquire).is_null()
    }
}

impl Default for MpscQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MpscQueue {
    fn drop(&mut self) {
        // No producers can exist with &mut self, so a None here means empty.
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn item(token: u64) -> Box<DeferredWorkItem> {
        DeferredWorkItem::new(token, Box::new(|| {}))
    }

    #[test]
    fn test_pop_empty() {
        let queue = MpscQueue::new();
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_pop_single() {
        let queue = MpscQueue::new();
        queue.push(item(7));
        assert!(!queue.is_empty());

        let popped = queue.pop().unwrap();
        assert_eq!(popped.token, 7);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_order_single_producer() {
        let queue = MpscQueue::new();
        for token in 0..16 {
            queue.push(item(token));
        }
        for token in 0..16 {
            assert_eq!(queue.pop().unwrap().token, token);
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_interleaved_push_pop() {
        let queue = MpscQueue::new();
        queue.push(item(1));
        queue.push(item(2));
        assert_eq!(queue.pop().unwrap().token, 1);
        queue.push(item(3));
        assert_eq!(queue.pop().unwrap().token, 2);
        assert_eq!(queue.pop().unwrap().token, 3);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_callback_invoked_once() {
        let queue = MpscQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        queue.push(DeferredWorkItem::new(
            0,
            Box::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        queue.pop().unwrap().invoke();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_queued_items() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let queue = MpscQueue::new();
            for _ in 0..8 {
                let counted = Arc::clone(&count);
                // Dropping the queue must free nodes without invoking them.
                queue.push(DeferredWorkItem::new(
                    0,
                    Box::new(move || {
                        counted.fetch_add(1, Ordering::SeqCst);
                    }),
                ));
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: u64 = 8;
        const PER_PRODUCER: u64 = 1000;

        let queue = Arc::new(MpscQueue::new());
        let mut handles = Vec::new();

        for producer in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                let base = producer * PER_PRODUCER;
                for offset in 0..PER_PRODUCER {
                    queue.push(item(base + offset));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = vec![false; (PRODUCERS * PER_PRODUCER) as usize];
        let mut count = 0u64;
        while let Some(node) = queue.pop() {
            let token = node.token as usize;
            assert!(!seen[token], "duplicate token {}", token);
            seen[token] = true;
            count += 1;
        }

        assert_eq!(count, PRODUCERS * PER_PRODUCER);
        assert!(seen.iter().all(|&s| s));
    }
}
