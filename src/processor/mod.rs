// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Processor registry and the monomorphized worker loop.
//!
//! A processor is a named strategy with a cold-path `check` (does the queue
//! plan fit?) and a hot-path `process_one_iteration`. The registry stores
//! type-erased `fn` pointers, but each launcher is the generic
//! [`run_processor`] instantiated for one concrete processor type, so the
//! per-iteration call inside the loop is direct. The hot loop never touches
//! the registry; lookup happens once at launch.

mod simple_forwarding;

pub use simple_forwarding::SimpleForwarding;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::config::QueueAssignment;
use crate::eal::{RxQueueHandle, TxQueueHandle};
use crate::error::{Error, Result};
use crate::rcu::RcuWorkerHandle;

/// Name used when a worker entry leaves the processor unset.
pub const DEFAULT_PROCESSOR_NAME: &str = "simple_forwarding";

/// An RX queue binding resolved to its device handle.
pub struct WorkerRxQueue {
    pub assignment: QueueAssignment,
    pub handle: RxQueueHandle,
}

/// A TX queue binding resolved to its device handle.
pub struct WorkerTxQueue {
    pub assignment: QueueAssignment,
    pub handle: TxQueueHandle,
}

/// The queue plan of one worker, resolved before launch.
pub struct QueueSet {
    pub rx: Vec<WorkerRxQueue>,
    pub tx: Vec<WorkerTxQueue>,
}

/// Everything a launched worker needs; constructed by the worker manager.
pub struct WorkerRun {
    pub lcore_id: u32,
    pub queues: QueueSet,
    pub stop_flag: Arc<AtomicBool>,
    pub rcu: Option<RcuWorkerHandle>,
}

/// A packet-processing strategy.
pub trait PacketProcessor: Sized + Send {
    /// Validate that the queue plan matches this processor's structural
    /// requirements. Cold path, called before launch.
    fn check(rx_queues: &[QueueAssignment], tx_queues: &[QueueAssignment]) -> Result<()>;

    /// Build a processor instance over the resolved queues.
    fn new(queues: QueueSet) -> Self;

    /// One receive → process → transmit pass. Returns the number of packets
    /// handled so the loop can issue a pause hint on empty iterations.
    fn process_one_iteration(&mut self) -> usize;
}

/// The tight worker loop, monomorphized per processor type.
pub fn run_processor<P: PacketProcessor>(run: WorkerRun) -> i32 {
    let mut processor = P::new(run.queues);

    while !run.stop_flag.load(Ordering::Relaxed) {
        let handled = processor.process_one_iteration();
        if let Some(rcu) = &run.rcu {
            rcu.report_quiescent();
        }
        if handled == 0 {
            std::hint::spin_loop();
        }
    }

    0
}

pub type LauncherFn = fn(WorkerRun) -> i32;
pub type CheckerFn = fn(&[QueueAssignment], &[QueueAssignment]) -> Result<()>;

/// One registry slot: the monomorphized loop and its plan checker.
#[derive(Clone, Copy, Debug)]
pub struct ProcessorEntry {
    pub launcher: LauncherFn,
    pub checker: CheckerFn,
}

/// Build the registry entry for a processor type.
pub fn make_entry<P: PacketProcessor>() -> ProcessorEntry {
    ProcessorEntry {
        launcher: run_processor::<P>,
        checker: P::check,
    }
}

static REGISTRY: OnceLock<RwLock<HashMap<String, ProcessorEntry>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, ProcessorEntry>> {
    REGISTRY.get_or_init(|| {
        let mut entries = HashMap::new();
        entries.insert(
            DEFAULT_PROCESSOR_NAME.to_string(),
            make_entry::<SimpleForwarding>(),
        );
        RwLock::new(entries)
    })
}

/// Register a processor under `name`. A later registration for the same name
/// overwrites the earlier one (tolerated for test injection).
pub fn register(name: impl Into<String>, entry: ProcessorEntry) {
    registry().write().unwrap().insert(name.into(), entry);
}

/// Look up a processor by name.
pub fn lookup(name: &str) -> Result<ProcessorEntry> {
    registry()
        .read()
        .unwrap()
        .get(name)
        .copied()
        .ok_or_else(|| Error::not_found(format!("Processor '{}' not found", name)))
}

/// All registered processor names, sorted (for error messages).
pub fn registered_names() -> Vec<String> {
    let mut names: Vec<String> = registry().read().unwrap().keys().cloned().collect();
    names.sort();
    names
}
