// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quiescent-state based reclamation primitive.
//!
//! One global token counter plus a cache-aligned counter per thread slot.
//! `start()` mints a new token; a thread acknowledges it by copying the
//! current token into its own counter (`quiescent()`); `check(token)` passes
//! once every registered online thread has acknowledged at least `token`.
//! Offline threads never block a grace period: counter value 0 is reserved to
//! mean offline, so tokens start at 1.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};

const OFFLINE: u64 = 0;

#[repr(align(64))]
struct ThreadSlot {
    /// Last token this thread acknowledged; [`OFFLINE`] while offline.
    counter: AtomicU64,
    registered: AtomicBool,
}

/// The shared QSBR variable, sized for up to `max_threads` thread slots.
pub struct QsbrVariable {
    token: AtomicU64,
    slots: Box<[ThreadSlot]>,
}

impl QsbrVariable {
    pub fn new(max_threads: u32) -> Self {
        let slots: Vec<ThreadSlot> = (0..max_threads)
            .map(|_| ThreadSlot {
                counter: AtomicU64::new(OFFLINE),
                registered: AtomicBool::new(false),
            })
            .collect();
        Self {
            token: AtomicU64::new(1),
            slots: slots.into_boxed_slice(),
        }
    }

    pub fn max_threads(&self) -> u32 {
        self.slots.len() as u32
    }

    fn slot(&self, thread_id: u32) -> Result<&ThreadSlot> {
        self.slots.get(thread_id as usize).ok_or_else(|| {
            Error::invalid_argument(format!(
                "thread id {} exceeds max_threads {}",
                thread_id,
                self.slots.len()
            ))
        })
    }

    pub fn register(&self, thread_id: u32) -> Result<()> {
        self.slot(thread_id)?.registered.store(true, Ordering::Release);
        Ok(())
    }

    pub fn unregister(&self, thread_id: u32) -> Result<()> {
        let slot = self.slot(thread_id)?;
        slot.registered.store(false, Ordering::Release);
        slot.counter.store(OFFLINE, Ordering::Release);
        Ok(())
    }

    /// Bring a registered thread online. It acknowledges every token minted
    /// so far, so it cannot retroactively block older grace periods.
    pub fn online(&self, thread_id: u32) -> Result<()> {
        let slot = self.slot(thread_id)?;
        let current = self.token.load(Ordering::SeqCst);
        slot.counter.store(current, Ordering::SeqCst);
        Ok(())
    }

    pub fn offline(&self, thread_id: u32) -> Result<()> {
        self.slot(thread_id)?.counter.store(OFFLINE, Ordering::Release);
        Ok(())
    }

    /// Report a quiescent state for `thread_id`: the thread is between
    /// critical sections and acknowledges everything minted so far.
    #[inline]
    pub fn quiescent(&self, thread_id: u32) {
        if let Some(slot) = self.slots.get(thread_id as usize) {
            let current = self.token.load(Ordering::Acquire);
            slot.counter.store(current, Ordering::Release);
        }
    }

    /// Mint a new grace-period token.
    pub fn start(&self) -> u64 {
        self.token.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether every registered online thread has acknowledged `token`.
    pub fn check(&self, token: u64) -> bool {
        for slot in self.slots.iter() {
            if !slot.registered.load(Ordering::Acquire) {
                continue;
            }
            let counter = slot.counter.load(Ordering::Acquire);
            if counter != OFFLINE && counter < token {
                return false;
            }
        }
        true
    }
}
