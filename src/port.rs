// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Port initialization and lifecycle.
//!
//! A [`DpdkPort`] walks one port entry through
//! uninitialized → initialized → started → stopped: capability validation,
//! buffer pool creation, device configuration and per-queue setup. The
//! [`PortManager`] owns every port and applies lifecycle operations across
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DpdkPortConfig;
use crate::eal::{
    Eal, EthDev, MbufPool, PortStats, ETHER_CRC_LEN, ETHER_HDR_LEN, ETHER_MAX_LEN, MBUF_HEADROOM,
};
use crate::error::{Error, Result};
use crate::log_notice;
use crate::logging::{Facility, Logger};

/// Per-core cache size for the buffer pool. 256 is the conventional value;
/// it reduces contention on the shared pool.
const POOL_CACHE_SIZE: u32 = 256;

pub struct DpdkPort {
    config: DpdkPortConfig,
    eal: Arc<Eal>,
    dev: Option<Arc<EthDev>>,
    pool: Option<MbufPool>,
    initialized: bool,
    started: bool,
}

impl DpdkPort {
    /// Create a port from configuration. Does not touch the device; call
    /// `initialize()` separately.
    pub fn new(eal: Arc<Eal>, config: DpdkPortConfig) -> Self {
        Self {
            config,
            eal,
            dev: None,
            pool: None,
            initialized: false,
            started: false,
        }
    }

    pub fn port_id(&self) -> u16 {
        self.config.port_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Validate capabilities, create the pool, configure the device and set
    /// up every RX/TX queue.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::failed_precondition(format!(
                "Port {} is already initialized",
                self.config.port_id
            )));
        }

        let dev = self.eal.device(self.config.port_id).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Port {} is not a valid port",
                self.config.port_id
            ))
        })?;

        if !self.config.num_descriptors.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "Port {}: num_descriptors must be a power of 2, got {}",
                self.config.port_id, self.config.num_descriptors
            )));
        }

        let info = dev.info();
        if self.config.num_rx_queues > info.max_rx_queues {
            return Err(Error::invalid_argument(format!(
                "RX queue count {} exceeds device maximum {} for port {}",
                self.config.num_rx_queues, info.max_rx_queues, self.config.port_id
            )));
        }
        if self.config.num_tx_queues > info.max_tx_queues {
            return Err(Error::invalid_argument(format!(
                "TX queue count {} exceeds device maximum {} for port {}",
                self.config.num_tx_queues, info.max_tx_queues, self.config.port_id
            )));
        }

        // Pool name must be unique per port. Data room adds headroom for
        // packet metadata in front of the payload.
        let pool = MbufPool::create(
            format!("mbuf_pool_{}", self.config.port_id),
            self.config.mbuf_pool_size,
            POOL_CACHE_SIZE,
            self.config.mbuf_size.saturating_add(MBUF_HEADROOM),
            self.eal.socket_id(),
        )
        .map_err(|e| {
            Error::internal(format!(
                "Failed to create mbuf pool for port {}: {}",
                self.config.port_id,
                e.message()
            ))
        })?;

        dev.configure(self.config.num_rx_queues, self.config.num_tx_queues)?;

        // Jumbo support: raise the MTU when buffers exceed a standard frame.
        if self.config.mbuf_size > ETHER_MAX_LEN {
            dev.set_mtu(self.config.mbuf_size - ETHER_HDR_LEN - ETHER_CRC_LEN);
        }

        for queue_id in 0..self.config.num_rx_queues {
            dev.setup_rx_queue(queue_id, self.config.num_descriptors, &pool)
                .map_err(|e| {
                    Error::internal(format!(
                        "Failed to setup RX queue {} on port {}: {}",
                        queue_id,
                        self.config.port_id,
                        e.message()
                    ))
                })?;
        }
        for queue_id in 0..self.config.num_tx_queues {
            dev.setup_tx_queue(queue_id, self.config.num_descriptors)
                .map_err(|e| {
                    Error::internal(format!(
                        "Failed to setup TX queue {} on port {}: {}",
                        queue_id,
                        self.config.port_id,
                        e.message()
                    ))
                })?;
        }

        self.dev = Some(dev);
        self.pool = Some(pool);
        self.initialized = true;
        Ok(())
    }

    /// Enable packet processing. Requires `initialize()`.
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::failed_precondition(format!(
                "Port {} is not initialized",
                self.config.port_id
            )));
        }
        if self.started {
            return Err(Error::failed_precondition(format!(
                "Port {} is already started",
                self.config.port_id
            )));
        }

        self.device()?.start()?;
        self.started = true;
        Ok(())
    }

    /// Disable packet processing. Requires `start()`.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::failed_precondition(format!(
                "Port {} is not started",
                self.config.port_id
            )));
        }

        self.device()?.stop()?;
        self.started = false;
        Ok(())
    }

    pub fn stats(&self) -> Result<PortStats> {
        if !self.initialized {
            return Err(Error::failed_precondition(format!(
                "Port {} is not initialized",
                self.config.port_id
            )));
        }
        Ok(self.device()?.stats())
    }

    pub fn pool(&self) -> Option<&MbufPool> {
        self.pool.as_ref()
    }

    fn device(&self) -> Result<&Arc<EthDev>> {
        self.dev.as_ref().ok_or_else(|| {
            Error::failed_precondition(format!(
                "Port {} is not initialized",
                self.config.port_id
            ))
        })
    }
}

impl Drop for DpdkPort {
    fn drop(&mut self) {
        if self.started {
            let _ = self.stop();
        }
    }
}

/// Owns all ports, keyed by port id.
pub struct PortManager {
    eal: Arc<Eal>,
    logger: Logger,
    ports: HashMap<u16, DpdkPort>,
}

impl PortManager {
    pub fn new(eal: Arc<Eal>, logger: Logger) -> Self {
        Self {
            eal,
            logger,
            ports: HashMap::new(),
        }
    }

    /// Create and initialize every configured port.
    pub fn initialize_ports(&mut self, configs: &[DpdkPortConfig]) -> Result<()> {
        self.ports.clear();

        for config in configs {
            let port_id = config.port_id;
            let mut port = DpdkPort::new(Arc::clone(&self.eal), config.clone());
            port.initialize().map_err(|e| {
                Error::internal(format!(
                    "Failed to initialize port {}: {}",
                    port_id,
                    e.message()
                ))
            })?;
            log_notice!(
                self.logger,
                Facility::Port,
                &format!(
                    "port {} initialized ({} rx / {} tx queues, pool {})",
                    port_id, config.num_rx_queues, config.num_tx_queues, config.mbuf_pool_size
                )
            );
            self.ports.insert(port_id, port);
        }

        Ok(())
    }

    pub fn start_all(&mut self) -> Result<()> {
        for (port_id, port) in &mut self.ports {
            port.start().map_err(|e| {
                Error::internal(format!("Failed to start port {}: {}", port_id, e.message()))
            })?;
        }
        Ok(())
    }

    pub fn stop_all(&mut self) -> Result<()> {
        for (port_id, port) in &mut self.ports {
            port.stop().map_err(|e| {
                Error::internal(format!("Failed to stop port {}: {}", port_id, e.message()))
            })?;
        }
        Ok(())
    }

    pub fn get_port(&self, port_id: u16) -> Option<&DpdkPort> {
        self.ports.get(&port_id)
    }

    pub fn port_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.ports.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DpdkConfig;
    use crate::logging::LogRegistry;

    fn test_logger() -> Logger {
        LogRegistry::with_capacity(64).logger()
    }

    fn port_config(port_id: u16) -> DpdkPortConfig {
        DpdkPortConfig {
            port_id,
            num_rx_queues: 2,
            num_tx_queues: 2,
            num_descriptors: 64,
            mbuf_pool_size: 1024,
            mbuf_size: 2048,
        }
    }

    fn eal_with_ports(ids: &[u16]) -> Arc<Eal> {
        let config = DpdkConfig {
            core_mask: Some("0x3".to_string()),
            ports: ids.iter().map(|&id| port_config(id)).collect(),
            ..Default::default()
        };
        Eal::init(&config, test_logger()).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(Arc::clone(&eal), port_config(0));

        assert!(!port.is_initialized());
        port.initialize().unwrap();
        assert!(port.is_initialized());

        port.start().unwrap();
        assert!(port.is_started());
        port.stop().unwrap();
        assert!(!port.is_started());
    }

    #[test]
    fn test_double_initialize_rejected() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(eal, port_config(0));
        port.initialize().unwrap();
        let err = port.initialize().unwrap_err();
        assert!(err.message().contains("already initialized"));
    }

    #[test]
    fn test_start_requires_initialize() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(eal, port_config(0));
        let err = port.start().unwrap_err();
        assert!(err.message().contains("not initialized"));
    }

    #[test]
    fn test_double_start_and_stop_rejected() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(eal, port_config(0));
        port.initialize().unwrap();
        port.start().unwrap();
        assert!(port.start().unwrap_err().message().contains("already started"));
        port.stop().unwrap();
        assert!(port.stop().unwrap_err().message().contains("not started"));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(eal, port_config(9));
        let err = port.initialize().unwrap_err();
        assert!(err.message().contains("not a valid port"));
    }

    #[test]
    fn test_non_power_of_two_descriptors_rejected() {
        let eal = eal_with_ports(&[0]);
        let mut config = port_config(0);
        config.num_descriptors = 100;
        let mut port = DpdkPort::new(eal, config);
        let err = port.initialize().unwrap_err();
        assert!(err.message().contains("power of 2"));
    }

    #[test]
    fn test_queue_count_exceeding_device_maximum() {
        let eal = eal_with_ports(&[0]);
        let mut config = port_config(0);
        config.num_rx_queues = 65;
        let mut port = DpdkPort::new(eal, config);
        let err = port.initialize().unwrap_err();
        assert!(err.message().contains("exceeds device maximum"));
    }

    #[test]
    fn test_pool_naming_and_headroom() {
        let eal = eal_with_ports(&[3]);
        let mut port = DpdkPort::new(eal, port_config(3));
        port.initialize().unwrap();

        let pool = port.pool().unwrap();
        assert_eq!(pool.name(), "mbuf_pool_3");
        assert_eq!(pool.capacity(), 1024);
        assert_eq!(pool.cache_size(), 256);
        assert_eq!(pool.data_room(), 2048 + MBUF_HEADROOM);
    }

    #[test]
    fn test_jumbo_mbuf_size_raises_mtu() {
        let eal = eal_with_ports(&[0]);
        let mut config = port_config(0);
        config.mbuf_size = 9216;
        let mut port = DpdkPort::new(Arc::clone(&eal), config);
        port.initialize().unwrap();

        let dev = eal.device(0).unwrap();
        assert_eq!(dev.mtu(), 9216 - ETHER_HDR_LEN - ETHER_CRC_LEN);
    }

    #[test]
    fn test_standard_mbuf_size_keeps_default_mtu() {
        let eal = eal_with_ports(&[0]);
        let mut port = DpdkPort::new(Arc::clone(&eal), port_config(0));
        port.initialize().unwrap();
        assert_eq!(eal.device(0).unwrap().mtu(), 1500);
    }

    #[test]
    fn test_drop_stops_started_port() {
        let eal = eal_with_ports(&[0]);
        {
            let mut port = DpdkPort::new(Arc::clone(&eal), port_config(0));
            port.initialize().unwrap();
            port.start().unwrap();
        }
        assert!(!eal.device(0).unwrap().is_started());
    }

    #[test]
    fn test_manager_initializes_and_starts_all() {
        let eal = eal_with_ports(&[0, 1]);
        let mut manager = PortManager::new(eal, test_logger());
        manager
            .initialize_ports(&[port_config(0), port_config(1)])
            .unwrap();
        assert_eq!(manager.port_ids(), vec![0, 1]);

        manager.start_all().unwrap();
        assert!(manager.get_port(0).unwrap().is_started());
        manager.stop_all().unwrap();
        assert!(!manager.get_port(1).unwrap().is_started());
    }

    #[test]
    fn test_manager_propagates_initialize_failure() {
        let eal = eal_with_ports(&[0]);
        let mut manager = PortManager::new(eal, test_logger());
        let err = manager
            .initialize_ports(&[port_config(0), port_config(9)])
            .unwrap_err();
        assert!(err.message().contains("Failed to initialize port 9"));
    }

    #[test]
    fn test_stats_require_initialization() {
        let eal = eal_with_ports(&[0]);
        let port = DpdkPort::new(eal, port_config(0));
        assert!(port.stats().is_err());
    }
}
