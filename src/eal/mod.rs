// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime layer: lcore bookkeeping and worker launch.
//!
//! Built once from a validated configuration. The core mask becomes the lcore
//! table; the lowest set bit is the main lcore and hosts the control plane.
//! `remote_launch` starts one OS thread per worker lcore, pinned to that core
//! (best effort: a failed pin logs a warning and the worker runs unpinned so
//! small machines still work), and `wait_lcore` joins it.

pub mod dev;

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::config::{ConfigValidator, DpdkConfig};
use crate::error::{Error, Result};
use crate::log_debug;
use crate::logging::{Facility, Logger};

pub use dev::{
    DevInfo, EthDev, Mbuf, MbufPool, PortStats, RxQueueHandle, TxQueueHandle, ETHER_CRC_LEN,
    ETHER_HDR_LEN, ETHER_MAX_LEN, MBUF_HEADROOM,
};

/// Sentinel for threads that are not runtime lcores.
pub const LCORE_ID_ANY: u32 = u32::MAX;

thread_local! {
    static CURRENT_LCORE: Cell<u32> = const { Cell::new(LCORE_ID_ANY) };
}

/// The initialized runtime: lcore table, virtual devices, launched workers.
pub struct Eal {
    main_lcore: u32,
    lcores: BTreeSet<u32>,
    devices: HashMap<u16, Arc<EthDev>>,
    launched: Mutex<HashMap<u32, JoinHandle<i32>>>,
    logger: Logger,
}

impl Eal {
    /// Initialize the runtime from a validated configuration. The calling
    /// thread becomes the main lcore.
    pub fn init(config: &DpdkConfig, logger: Logger) -> Result<Arc<Self>> {
        let args = build_eal_args(config, "dpdkd");
        log_debug!(
            logger,
            Facility::Eal,
            &format!("runtime arguments: {}", args.join(" "))
        );

        let lcores = ConfigValidator::parse_coremask(config.core_mask.as_deref());
        let main_lcore = lcores.iter().next().copied().unwrap_or(0);

        CURRENT_LCORE.with(|cell| cell.set(main_lcore));

        let devices = config
            .ports
            .iter()
            .map(|port| (port.port_id, Arc::new(EthDev::new(port.port_id))))
            .collect();

        Ok(Arc::new(Self {
            main_lcore,
            lcores,
            devices,
            launched: Mutex::new(HashMap::new()),
            logger,
        }))
    }

    pub fn main_lcore(&self) -> u32 {
        self.main_lcore
    }

    /// All lcores in the configured mask, ascending.
    pub fn lcore_ids(&self) -> Vec<u32> {
        self.lcores.iter().copied().collect()
    }

    /// The lcore ID of the calling thread, or [`LCORE_ID_ANY`] for threads
    /// the runtime did not launch.
    pub fn current_lcore() -> u32 {
        CURRENT_LCORE.with(|cell| cell.get())
    }

    pub fn device(&self, port_id: u16) -> Option<Arc<EthDev>> {
        self.devices.get(&port_id).cloned()
    }

    /// NUMA socket of the runtime. The emulation is single-socket.
    pub fn socket_id(&self) -> u32 {
        0
    }

    /// Launch `body` on the given worker lcore. One launch per lcore at a
    /// time; the main lcore is refused.
    pub fn remote_launch<F>(&self, lcore_id: u32, body: F) -> Result<()>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        if lcore_id == self.main_lcore {
            return Err(Error::invalid_argument(format!(
                "lcore {} is the main lcore",
                lcore_id
            )));
        }
        if !self.lcores.contains(&lcore_id) {
            return Err(Error::invalid_argument(format!(
                "lcore {} is not in the configured coremask",
                lcore_id
            )));
        }

        let mut launched = self.launched.lock().unwrap();
        if launched.contains_key(&lcore_id) {
            return Err(Error::failed_precondition(format!(
                "lcore {} is busy",
                lcore_id
            )));
        }

        let logger = self.logger.clone();
        let handle = std::thread::Builder::new()
            .name(format!("lcore-{}", lcore_id))
            .spawn(move || {
                CURRENT_LCORE.with(|cell| cell.set(lcore_id));
                pin_to_core(lcore_id, &logger);
                body()
            })
            .map_err(|e| Error::internal(format!("failed to spawn lcore thread: {}", e)))?;

        launched.insert(lcore_id, handle);
        Ok(())
    }

    /// Join the worker on `lcore_id` and return its exit code. Returns 0 for
    /// an lcore that was never launched, mirroring the wait semantics of the
    /// real runtime.
    pub fn wait_lcore(&self, lcore_id: u32) -> i32 {
        let handle = self.launched.lock().unwrap().remove(&lcore_id);
        match handle {
            Some(handle) => handle.join().unwrap_or(-1),
            None => 0,
        }
    }
}

fn pin_to_core(lcore_id: u32, logger: &Logger) {
    let mut cpu_set = CpuSet::new();
    let pinned = cpu_set
        .set(lcore_id as usize)
        .and_then(|_| sched_setaffinity(Pid::from_raw(0), &cpu_set));
    match pinned {
        Ok(()) => log_debug!(
            logger,
            Facility::Eal,
            &format!("pinned worker thread to core {}", lcore_id)
        ),
        Err(e) => logger.warning(
            Facility::Eal,
            &format!(
                "could not pin worker thread to core {}: {} (running unpinned)",
                lcore_id, e
            ),
        ),
    }
}

/// Build the argument vector the equivalent kernel-bypass runtime would be
/// handed: `-c`, `-n`, `-a`, `-b`, `--log-level`.
pub fn build_eal_args(config: &DpdkConfig, program_name: &str) -> Vec<String> {
    let mut args = vec![program_name.to_string()];

    if let Some(mask) = &config.core_mask {
        args.push("-c".to_string());
        args.push(mask.clone());
    }
    if let Some(channels) = config.memory_channels {
        args.push("-n".to_string());
        args.push(channels.to_string());
    }
    for addr in &config.pci_allowlist {
        args.push("-a".to_string());
        args.push(addr.clone());
    }
    for addr in &config.pci_blocklist {
        args.push("-b".to_string());
        args.push(addr.clone());
    }
    if let Some(level) = config.log_level {
        args.push("--log-level".to_string());
        args.push(level.to_string());
    }

    args
}
