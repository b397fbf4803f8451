// SPDX-License-Identifier: Apache-2.0 OR MIT

//! QSBR manager: registration, grace-period scheduling, deferred reclamation.
//!
//! The manager itself lives on the control plane and owns the consumer side
//! (the pending list). Workers interact through two shareable handles:
//! [`RcuRegistry`] for registration at launch time and [`RcuWorkerHandle`]
//! for the hot path (quiescent-state reports and deferred-work posts).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::qsbr::QsbrVariable;
use super::queue::{DeferredAction, DeferredWorkItem, MpscQueue};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RcuConfig {
    pub max_threads: u32,
    pub poll_interval_ms: u64,
}

impl Default for RcuConfig {
    fn default() -> Self {
        Self {
            max_threads: 64,
            poll_interval_ms: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RcuState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

struct RcuShared {
    qsbr: QsbrVariable,
    queue: MpscQueue,
    registered: Mutex<HashSet<u32>>,
}

/// Single-consumer manager. `poll_tick()` and the pending list belong to the
/// control-plane thread; everything multi-threaded goes through the handles.
pub struct RcuManager {
    shared: Option<Arc<RcuShared>>,
    pending: Vec<Box<DeferredWorkItem>>,
    config: RcuConfig,
    state: RcuState,
}

impl RcuManager {
    pub fn new() -> Self {
        Self {
            shared: None,
            pending: Vec::new(),
            config: RcuConfig::default(),
            state: RcuState::Uninitialized,
        }
    }

    /// Allocate the QSBR variable. Must precede `start()`.
    pub fn init(&mut self, config: RcuConfig) -> Result<()> {
        if self.state != RcuState::Uninitialized {
            return Err(Error::failed_precondition(
                "RcuManager is already initialized",
            ));
        }
        self.shared = Some(Arc::new(RcuShared {
            qsbr: QsbrVariable::new(config.max_threads),
            queue: MpscQueue::new(),
            registered: Mutex::new(HashSet::new()),
        }));
        self.config = config;
        self.state = RcuState::Initialized;
        Ok(())
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.config.poll_interval_ms
    }

    /// Shareable registration handle for the worker manager.
    pub fn registry(&self) -> Result<RcuRegistry> {
        let shared = self.shared()?;
        Ok(RcuRegistry {
            shared: Arc::clone(shared),
        })
    }

    pub fn register_thread(&self, lcore_id: u32) -> Result<()> {
        self.registry()?.register_thread(lcore_id)
    }

    pub fn unregister_thread(&self, lcore_id: u32) -> Result<()> {
        self.registry()?.unregister_thread(lcore_id)
    }

    /// Schedule `callback` to run once the grace period starting now has
    /// elapsed. Control-plane only.
    pub fn call_after_grace_period(&mut self, callback: DeferredAction) -> Result<()> {
        if self.state != RcuState::Running {
            return Err(Error::failed_precondition("RcuManager is not running"));
        }
        let shared = self.shared()?;
        let token = shared.qsbr.start();
        self.pending.push(DeferredWorkItem::new(token, callback));
        Ok(())
    }

    /// Arm the poll path. Requires prior `init()`.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            RcuState::Uninitialized => Err(Error::failed_precondition(
                "RcuManager not initialized. Call init() first.",
            )),
            RcuState::Initialized => {
                self.state = RcuState::Running;
                Ok(())
            }
            RcuState::Running => Err(Error::failed_precondition("RcuManager is already running")),
            RcuState::Stopped => Err(Error::failed_precondition("RcuManager is stopped")),
        }
    }

    /// Cancel polling and discard every pending item without invoking it.
    /// The system is tearing down; the objects those callbacks would reclaim
    /// are freed by port/worker teardown or by process exit.
    pub fn stop(&mut self) {
        if self.state != RcuState::Running {
            return;
        }
        self.state = RcuState::Stopped;

        if let Some(shared) = &self.shared {
            while let Some(item) = shared.queue.pop() {
                self.pending.push(item);
            }
        }
        self.pending.clear();
    }

    pub fn is_running(&self) -> bool {
        self.state == RcuState::Running
    }

    /// One poll pass: drain the producer queue into the pending list, then
    /// invoke and remove every item whose grace period completed. Driven by
    /// the orchestrator's 1 ms timer while running.
    pub fn poll_tick(&mut self) {
        if self.state != RcuState::Running {
            return;
        }
        let shared = match &self.shared {
            Some(shared) => Arc::clone(shared),
            None => return,
        };

        while let Some(item) = shared.queue.pop() {
            self.pending.push(item);
        }

        let mut index = 0;
        while index < self.pending.len() {
            if shared.qsbr.check(self.pending[index].token) {
                let item = self.pending.remove(index);
                item.invoke();
            } else {
                index += 1;
            }
        }
    }

    /// Whether any items await a grace period. Consumer-side view.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn shared(&self) -> Result<&Arc<RcuShared>> {
        self.shared
            .as_ref()
            .ok_or_else(|| Error::failed_precondition("RcuManager not initialized"))
    }
}

impl Default for RcuManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration-side handle, wired into the worker manager.
#[derive(Clone)]
pub struct RcuRegistry {
    shared: Arc<RcuShared>,
}

impl RcuRegistry {
    /// Register a worker lcore and bring it online. A thread must not
    /// register twice without unregistering.
    pub fn register_thread(&self, lcore_id: u32) -> Result<()> {
        let mut registered = self.shared.registered.lock().unwrap();

        if lcore_id >= self.shared.qsbr.max_threads() {
            return Err(Error::invalid_argument(format!(
                "lcore_id {} exceeds max_threads {}",
                lcore_id,
                self.shared.qsbr.max_threads()
            )));
        }
        if registered.contains(&lcore_id) {
            return Err(Error::already_exists(format!(
                "Thread {} is already registered",
                lcore_id
            )));
        }

        self.shared.qsbr.register(lcore_id)?;
        self.shared.qsbr.online(lcore_id)?;
        registered.insert(lcore_id);
        Ok(())
    }

    /// Take a worker lcore offline and unregister it.
    pub fn unregister_thread(&self, lcore_id: u32) -> Result<()> {
        let mut registered = self.shared.registered.lock().unwrap();

        if !registered.remove(&lcore_id) {
            return Err(Error::not_found(format!(
                "Thread {} is not registered",
                lcore_id
            )));
        }

        self.shared.qsbr.offline(lcore_id)?;
        self.shared.qsbr.unregister(lcore_id)?;
        Ok(())
    }

    /// Hot-path handle for one worker.
    pub fn worker_handle(&self, lcore_id: u32) -> RcuWorkerHandle {
        RcuWorkerHandle {
            shared: Arc::clone(&self.shared),
            lcore_id,
        }
    }
}

/// Per-worker handle: quiescent-state reports and deferred-work posting.
#[derive(Clone)]
pub struct RcuWorkerHandle {
    shared: Arc<RcuShared>,
    lcore_id: u32,
}

impl RcuWorkerHandle {
    pub fn lcore_id(&self) -> u32 {
        self.lcore_id
    }

    /// Report that this worker is between critical sections.
    #[inline]
    pub fn report_quiescent(&self) {
        self.shared.qsbr.quiescent(self.lcore_id);
    }

    /// Mint a grace-period token for an item about to be posted.
    pub fn start_grace_period(&self) -> u64 {
        self.shared.qsbr.start()
    }

    /// Post a deferred work item into the reclamation queue. Wait-free; the
    /// token must already be on the item.
    pub fn post_deferred_work(&self, item: Box<DeferredWorkItem>) {
        self.shared.queue.push(item);
    }
}
