// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration model and tooling for the daemon.
//!
//! A configuration is decoded once ([`ConfigParser`]), audited once
//! ([`ConfigValidator`]) and then consumed read-only by the port and worker
//! managers. Unrecognized top-level keys survive decode/print round trips as
//! ordered `(name, literal)` passthrough parameters.

pub(crate) mod parser;
mod printer;
mod validator;

pub use parser::ConfigParser;
pub use printer::ConfigPrinter;
pub use validator::ConfigValidator;

/// One `(port, queue)` hardware queue binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueAssignment {
    pub port_id: u16,
    pub queue_id: u16,
}

/// Configuration of a single poll-mode worker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PmdThreadConfig {
    /// The lcore (CPU core) the worker is pinned to.
    pub lcore_id: u32,

    /// RX queue bindings for this worker.
    pub rx_queues: Vec<QueueAssignment>,

    /// TX queue bindings for this worker.
    pub tx_queues: Vec<QueueAssignment>,

    /// Processor name (empty string = use the default processor).
    pub processor_name: String,
}

/// Configuration of a single NIC port.
#[derive(Debug, Clone, PartialEq)]
pub struct DpdkPortConfig {
    /// Port ID, unique across the configuration.
    pub port_id: u16,

    /// Number of RX queues (must be > 0).
    pub num_rx_queues: u16,

    /// Number of TX queues (must be > 0).
    pub num_tx_queues: u16,

    /// Descriptors per RX/TX queue (must be a power of 2).
    pub num_descriptors: u16,

    /// Total number of mbufs in the port's pool.
    pub mbuf_pool_size: u32,

    /// Data room size for packet buffers. Common values: 2048 (standard
    /// Ethernet), 9216 (jumbo frames).
    pub mbuf_size: u16,
}

/// Top-level configuration. All global fields are optional so partial
/// configuration files stay usable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DpdkConfig {
    /// Core mask for CPU cores to use (hex string, e.g. "0xff"). Maps to the
    /// runtime's `-c` argument.
    pub core_mask: Option<String>,

    /// Number of memory channels (`-n`).
    pub memory_channels: Option<i64>,

    /// PCI devices to allow, each `DDDD:BB:DD.F` (`-a`).
    pub pci_allowlist: Vec<String>,

    /// PCI devices to block, each `DDDD:BB:DD.F` (`-b`).
    pub pci_blocklist: Vec<String>,

    /// Runtime log level, 0..=8 (`--log-level`).
    pub log_level: Option<i64>,

    /// Number of huge pages to reserve.
    pub huge_pages: Option<i64>,

    /// Port configurations.
    pub ports: Vec<DpdkPortConfig>,

    /// PMD worker configurations.
    pub pmd_threads: Vec<PmdThreadConfig>,

    /// Unrecognized top-level keys as ordered `(name, literal)` pairs.
    pub additional_params: Vec<(String, String)>,
}
