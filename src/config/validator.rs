// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-field configuration validation.
//!
//! Pure function over the decoded model. Checks run in a fixed order and the
//! first failure is returned; callers (and tests) rely on the message text.

use std::collections::{BTreeSet, HashSet};

use super::{DpdkConfig, DpdkPortConfig};
use crate::error::{Error, Result};

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the whole configuration. Returns the first failure.
    pub fn validate(config: &DpdkConfig) -> Result<()> {
        if let Some(mask) = &config.core_mask {
            if !is_valid_hex_string(mask) {
                return Err(Error::invalid_argument(
                    "core_mask must be a valid hexadecimal string",
                ));
            }
        }

        if let Some(channels) = config.memory_channels {
            if channels <= 0 {
                return Err(Error::invalid_argument("memory_channels must be positive"));
            }
        }

        for addr in &config.pci_allowlist {
            if !is_valid_pci_address(addr) {
                return Err(Error::invalid_argument(format!(
                    "Invalid PCI address in allowlist: {}",
                    addr
                )));
            }
        }

        for addr in &config.pci_blocklist {
            if !is_valid_pci_address(addr) {
                return Err(Error::invalid_argument(format!(
                    "Invalid PCI address in blocklist: {}",
                    addr
                )));
            }
        }

        for addr in &config.pci_allowlist {
            if config.pci_blocklist.contains(addr) {
                return Err(Error::invalid_argument(format!(
                    "PCI address appears in both allowlist and blocklist: {}",
                    addr
                )));
            }
        }

        if let Some(level) = config.log_level {
            if !(0..=8).contains(&level) {
                return Err(Error::invalid_argument("log_level must be between 0 and 8"));
            }
        }

        if let Some(pages) = config.huge_pages {
            if pages <= 0 {
                return Err(Error::invalid_argument("huge_pages must be positive"));
            }
        }

        if !config.pmd_threads.is_empty() {
            validate_pmd_threads(config)?;
        }

        validate_ports(&config.ports)?;

        Ok(())
    }

    /// Parse a core mask into the set of available lcore IDs. Bit *i* set
    /// means lcore *i* is available; empty or missing input yields the empty
    /// set.
    pub fn parse_coremask(core_mask: Option<&str>) -> BTreeSet<u32> {
        let mut lcores = BTreeSet::new();

        let mask = match core_mask {
            Some(m) if !m.is_empty() => m,
            _ => return lcores,
        };

        let digits = mask
            .strip_prefix("0x")
            .or_else(|| mask.strip_prefix("0X"))
            .unwrap_or(mask);

        let value = u64::from_str_radix(digits, 16).unwrap_or(0);
        for bit in 0..64 {
            if value & (1u64 << bit) != 0 {
                lcores.insert(bit);
            }
        }

        lcores
    }

    /// The main lcore is the lowest set bit of the mask; 0 if the mask is
    /// absent or empty.
    pub fn main_lcore(core_mask: Option<&str>) -> u32 {
        Self::parse_coremask(core_mask)
            .into_iter()
            .next()
            .unwrap_or(0)
    }
}

fn validate_pmd_threads(config: &DpdkConfig) -> Result<()> {
    let available = ConfigValidator::parse_coremask(config.core_mask.as_deref());
    let main_lcore = ConfigValidator::main_lcore(config.core_mask.as_deref());

    let has_worker_lcores = available.iter().any(|&lcore| lcore != main_lcore);
    if !has_worker_lcores {
        return Err(Error::invalid_argument(
            "No worker lcores available (coremask only contains main lcore)",
        ));
    }

    let mut seen_lcores = HashSet::new();
    for thread in &config.pmd_threads {
        let lcore = thread.lcore_id;

        if lcore == main_lcore {
            return Err(Error::invalid_argument(format!(
                "PMD thread cannot use main lcore {} (reserved for control plane)",
                lcore
            )));
        }

        if !available.contains(&lcore) {
            return Err(Error::invalid_argument(format!(
                "PMD thread lcore {} is not in coremask",
                lcore
            )));
        }

        if !seen_lcores.insert(lcore) {
            return Err(Error::invalid_argument(format!(
                "Duplicate lcore assignment: {}",
                lcore
            )));
        }
    }

    let mut seen_rx: HashSet<(u16, u16)> = HashSet::new();
    for thread in &config.pmd_threads {
        for queue in &thread.rx_queues {
            let port = find_port(&config.ports, queue.port_id).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "PMD thread on lcore {}: unknown port {}",
                    thread.lcore_id, queue.port_id
                ))
            })?;

            if queue.queue_id >= port.num_rx_queues {
                return Err(Error::invalid_argument(format!(
                    "PMD thread on lcore {}: RX queue {} out of range for port {} (max: {})",
                    thread.lcore_id,
                    queue.queue_id,
                    queue.port_id,
                    port.num_rx_queues - 1
                )));
            }

            if !seen_rx.insert((queue.port_id, queue.queue_id)) {
                return Err(Error::invalid_argument(format!(
                    "Duplicate RX queue assignment: port {}, queue {}",
                    queue.port_id, queue.queue_id
                )));
            }
        }
    }

    let mut seen_tx: HashSet<(u16, u16)> = HashSet::new();
    for thread in &config.pmd_threads {
        for queue in &thread.tx_queues {
            let port = find_port(&config.ports, queue.port_id).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "PMD thread on lcore {}: unknown port {}",
                    thread.lcore_id, queue.port_id
                ))
            })?;

            if queue.queue_id >= port.num_tx_queues {
                return Err(Error::invalid_argument(format!(
                    "PMD thread on lcore {}: TX queue {} out of range for port {} (max: {})",
                    thread.lcore_id,
                    queue.queue_id,
                    queue.port_id,
                    port.num_tx_queues - 1
                )));
            }

            if !seen_tx.insert((queue.port_id, queue.queue_id)) {
                return Err(Error::invalid_argument(format!(
                    "Duplicate TX queue assignment: port {}, queue {}",
                    queue.port_id, queue.queue_id
                )));
            }
        }
    }

    Ok(())
}

fn validate_ports(ports: &[DpdkPortConfig]) -> Result<()> {
    let mut seen_ids = HashSet::new();

    for port in ports {
        if !seen_ids.insert(port.port_id) {
            return Err(Error::invalid_argument(format!(
                "Duplicate port_id: {}",
                port.port_id
            )));
        }

        if port.num_rx_queues == 0 {
            return Err(Error::invalid_argument(format!(
                "Port {}: num_rx_queues must be > 0",
                port.port_id
            )));
        }

        if port.num_tx_queues == 0 {
            return Err(Error::invalid_argument(format!(
                "Port {}: num_tx_queues must be > 0",
                port.port_id
            )));
        }

        if !is_power_of_two(port.num_descriptors) {
            return Err(Error::invalid_argument(format!(
                "Port {}: num_descriptors must be a power of 2",
                port.port_id
            )));
        }

        if port.mbuf_pool_size == 0 {
            return Err(Error::invalid_argument(format!(
                "Port {}: mbuf_pool_size must be > 0",
                port.port_id
            )));
        }

        // Minimum pool size accounting for per-core caches:
        // descriptors x queues + cache headroom (512 = ~2 cores x 256 cache).
        let min_recommended = u64::from(port.num_descriptors)
            * (u64::from(port.num_rx_queues) + u64::from(port.num_tx_queues))
            + 512;
        if u64::from(port.mbuf_pool_size) < min_recommended {
            eprintln!(
                "Warning: Port {} mbuf_pool_size ({}) is below recommended minimum ({}). \
                 Consider increasing to account for per-core caches.",
                port.port_id, port.mbuf_pool_size, min_recommended
            );
        }

        if port.mbuf_size == 0 {
            return Err(Error::invalid_argument(format!(
                "Port {}: mbuf_size must be > 0",
                port.port_id
            )));
        }
    }

    Ok(())
}

fn find_port(ports: &[DpdkPortConfig], port_id: u16) -> Option<&DpdkPortConfig> {
    ports.iter().find(|p| p.port_id == port_id)
}

fn is_valid_hex_string(hex: &str) -> bool {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_valid_pci_address(addr: &str) -> bool {
    // DDDD:BB:DD.F, all hex digits.
    let bytes = addr.as_bytes();
    if bytes.len() != 12 {
        return false;
    }
    if bytes[4] != b':' || bytes[7] != b':' || bytes[10] != b'.' {
        return false;
    }
    [0usize, 1, 2, 3, 5, 6, 8, 9, 11]
        .iter()
        .all(|&i| bytes[i].is_ascii_hexdigit())
}

fn is_power_of_two(n: u16) -> bool {
    n > 0 && (n & (n - 1)) == 0
}
