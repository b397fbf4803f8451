// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ring-backed virtual ethernet devices and packet buffer pools.
//!
//! Each configured port becomes one virtual device whose RX/TX queues are
//! fixed-depth rings of `num_descriptors` slots. The worker-facing side is
//! `rx_burst`/`tx_burst`; the wire side (`inject_rx`/`collect_tx`) is used by
//! tooling and tests to play the role of the physical medium.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_queue::ArrayQueue;

use crate::error::{Error, Result};

/// Headroom reserved in front of packet data in each buffer.
pub const MBUF_HEADROOM: u16 = 128;
/// Maximum standard (non-jumbo) Ethernet frame length.
pub const ETHER_MAX_LEN: u16 = 1518;
pub const ETHER_HDR_LEN: u16 = 14;
pub const ETHER_CRC_LEN: u16 = 4;
const DEFAULT_MTU: u16 = 1500;

const MAX_RX_QUEUES: u16 = 64;
const MAX_TX_QUEUES: u16 = 64;

/// Static device capabilities.
#[derive(Debug, Clone, Copy)]
pub struct DevInfo {
    pub max_rx_queues: u16,
    pub max_tx_queues: u16,
}

/// Snapshot of device counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

#[derive(Default)]
struct DevCounters {
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_errors: AtomicU64,
    tx_errors: AtomicU64,
}

struct PoolInner {
    name: String,
    capacity: u32,
    data_room: u16,
    available: AtomicU32,
}

/// Named fixed-capacity packet buffer pool.
///
/// `cache_size` is recorded for parity with the real allocator's per-core
/// caches; the emulation accounts globally.
#[derive(Clone)]
pub struct MbufPool {
    inner: Arc<PoolInner>,
    cache_size: u32,
}

impl MbufPool {
    pub fn create(
        name: impl Into<String>,
        capacity: u32,
        cache_size: u32,
        data_room: u16,
        _socket_id: u32,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(Error::invalid_argument(format!(
                "mbuf pool '{}' capacity must be > 0",
                name
            )));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                capacity,
                data_room,
                available: AtomicU32::new(capacity),
            }),
            cache_size,
        })
    }

    /// Take one buffer; `None` when the pool is exhausted.
    pub fn alloc(&self) -> Option<Mbuf> {
        let mut available = self.inner.available.load(Ordering::Relaxed);
        loop {
            if available == 0 {
                return None;
            }
            match self.inner.available.compare_exchange_weak(
                available,
                available - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(Mbuf {
                        data: Vec::with_capacity(usize::from(self.inner.data_room)),
                        pool: Some(Arc::clone(&self.inner)),
                    })
                }
                Err(current) => available = current,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    pub fn cache_size(&self) -> u32 {
        self.cache_size
    }

    pub fn data_room(&self) -> u16 {
        self.inner.data_room
    }

    pub fn available(&self) -> u32 {
        self.inner.available.load(Ordering::Relaxed)
    }
}

/// One packet buffer. Dropping it returns its credit to the owning pool.
pub struct Mbuf {
    data: Vec<u8>,
    pool: Option<Arc<PoolInner>>,
}

impl Mbuf {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload. Fails when it exceeds the pool's data room.
    pub fn set_data(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(pool) = &self.pool {
            if bytes.len() > usize::from(pool.data_room) {
                return Err(Error::invalid_argument(format!(
                    "packet of {} bytes exceeds data room {} of pool '{}'",
                    bytes.len(),
                    pool.data_room,
                    pool.name
                )));
            }
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Mbuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mbuf").field("len", &self.data.len()).finish()
    }
}

impl Drop for Mbuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.available.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DevState {
    Unconfigured,
    Configured { num_rx: u16, num_tx: u16 },
}

/// A virtual ethernet device.
///
/// Lifecycle: unconfigured -> configured (queue counts fixed) -> queues set
/// up -> started -> stopped. Queue setup is rejected while started.
pub struct EthDev {
    port_id: u16,
    info: DevInfo,
    state: Mutex<DevState>,
    rx_rings: Mutex<Vec<Option<Arc<ArrayQueue<Mbuf>>>>>,
    tx_rings: Mutex<Vec<Option<Arc<ArrayQueue<Mbuf>>>>>,
    started: AtomicBool,
    mtu: AtomicU16,
    counters: Arc<DevCounters>,
}

impl EthDev {
    pub(crate) fn new(port_id: u16) -> Self {
        Self {
            port_id,
            info: DevInfo {
                max_rx_queues: MAX_RX_QUEUES,
                max_tx_queues: MAX_TX_QUEUES,
            },
            state: Mutex::new(DevState::Unconfigured),
            rx_rings: Mutex::new(Vec::new()),
            tx_rings: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            mtu: AtomicU16::new(DEFAULT_MTU),
            counters: Arc::new(DevCounters::default()),
        }
    }

    pub fn port_id(&self) -> u16 {
        self.port_id
    }

    pub fn info(&self) -> DevInfo {
        self.info
    }

    /// Fix the RX/TX queue counts and allocate empty queue tables.
    pub fn configure(&self, num_rx: u16, num_tx: u16) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(Error::failed_precondition(format!(
                "Port {} cannot be reconfigured while started",
                self.port_id
            )));
        }
        if num_rx > self.info.max_rx_queues || num_tx > self.info.max_tx_queues {
            return Err(Error::invalid_argument(format!(
                "Port {}: queue counts {}/{} exceed device maxima {}/{}",
                self.port_id,
                num_rx,
                num_tx,
                self.info.max_rx_queues,
                self.info.max_tx_queues
            )));
        }

        *self.state.lock().unwrap() = DevState::Configured { num_rx, num_tx };
        *self.rx_rings.lock().unwrap() = (0..num_rx).map(|_| None).collect();
        *self.tx_rings.lock().unwrap() = (0..num_tx).map(|_| None).collect();
        Ok(())
    }

    pub fn set_mtu(&self, mtu: u16) {
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Relaxed)
    }

    pub fn setup_rx_queue(&self, queue_id: u16, num_descriptors: u16, pool: &MbufPool) -> Result<()> {
        // The pool binding is positional in the emulation; the ring slots are
        // what num_descriptors sizes.
        let _ = pool;
        self.setup_queue(&self.rx_rings, "RX", queue_id, num_descriptors)
    }

    pub fn setup_tx_queue(&self, queue_id: u16, num_descriptors: u16) -> Result<()> {
        self.setup_queue(&self.tx_rings, "TX", queue_id, num_descriptors)
    }

    fn setup_queue(
        &self,
        rings: &Mutex<Vec<Option<Arc<ArrayQueue<Mbuf>>>>>,
        direction: &str,
        queue_id: u16,
        num_descriptors: u16,
    ) -> Result<()> {
        if matches!(*self.state.lock().unwrap(), DevState::Unconfigured) {
            return Err(Error::failed_precondition(format!(
                "Port {} is not configured",
                self.port_id
            )));
        }
        if self.started.load(Ordering::Acquire) {
            return Err(Error::failed_precondition(format!(
                "Port {} queues cannot be set up while started",
                self.port_id
            )));
        }

        let mut rings = rings.lock().unwrap();
        let slot = rings.get_mut(usize::from(queue_id)).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Port {}: {} queue {} exceeds configured count",
                self.port_id, direction, queue_id
            ))
        })?;
        *slot = Some(Arc::new(ArrayQueue::new(usize::from(num_descriptors))));
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        let state = *self.state.lock().unwrap();
        match state {
            DevState::Unconfigured => Err(Error::failed_precondition(format!(
                "Port {} is not configured",
                self.port_id
            ))),
            DevState::Configured { .. } => {
                self.started.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    pub fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Worker-side RX handle. The queue must have been set up.
    pub fn rx_queue(&self, queue_id: u16) -> Result<RxQueueHandle> {
        let ring = self.ring(&self.rx_rings, "RX", queue_id)?;
        Ok(RxQueueHandle {
            ring,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Worker-side TX handle. The queue must have been set up.
    pub fn tx_queue(&self, queue_id: u16) -> Result<TxQueueHandle> {
        let ring = self.ring(&self.tx_rings, "TX", queue_id)?;
        Ok(TxQueueHandle {
            ring,
            counters: Arc::clone(&self.counters),
        })
    }

    fn ring(
        &self,
        rings: &Mutex<Vec<Option<Arc<ArrayQueue<Mbuf>>>>>,
        direction: &str,
        queue_id: u16,
    ) -> Result<Arc<ArrayQueue<Mbuf>>> {
        rings
            .lock()
            .unwrap()
            .get(usize::from(queue_id))
            .and_then(|slot| slot.clone())
            .ok_or_else(|| {
                Error::failed_precondition(format!(
                    "Port {}: {} queue {} is not set up",
                    self.port_id, direction, queue_id
                ))
            })
    }

    /// Wire side: deliver a packet into an RX ring. A full ring drops the
    /// packet and counts an RX error, like a NIC out of descriptors.
    pub fn inject_rx(&self, queue_id: u16, mbuf: Mbuf) -> Result<()> {
        let ring = self.ring(&self.rx_rings, "RX", queue_id)?;
        if ring.push(mbuf).is_err() {
            self.counters.rx_errors.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Wire side: drain everything a TX ring currently holds.
    pub fn collect_tx(&self, queue_id: u16) -> Result<Vec<Mbuf>> {
        let ring = self.ring(&self.tx_rings, "TX", queue_id)?;
        let mut out = Vec::new();
        while let Some(mbuf) = ring.pop() {
            out.push(mbuf);
        }
        Ok(out)
    }

    pub fn stats(&self) -> PortStats {
        PortStats {
            rx_packets: self.counters.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.counters.tx_packets.load(Ordering::Relaxed),
            rx_bytes: self.counters.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.counters.tx_bytes.load(Ordering::Relaxed),
            rx_errors: self.counters.rx_errors.load(Ordering::Relaxed),
            tx_errors: self.counters.tx_errors.load(Ordering::Relaxed),
        }
    }
}

/// Hot-path RX handle held directly by a worker.
#[derive(Clone)]
pub struct RxQueueHandle {
    ring: Arc<ArrayQueue<Mbuf>>,
    counters: Arc<DevCounters>,
}

impl RxQueueHandle {
    /// Receive up to `max` packets into `out`. Returns the count received.
    pub fn rx_burst(&self, out: &mut Vec<Mbuf>, max: usize) -> usize {
        let mut received = 0;
        while received < max {
            match self.ring.pop() {
                Some(mbuf) => {
                    self.counters.rx_packets.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .rx_bytes
                        .fetch_add(mbuf.len() as u64, Ordering::Relaxed);
                    out.push(mbuf);
                    received += 1;
                }
                None => break,
            }
        }
        received
    }
}

/// Hot-path TX handle held directly by a worker.
#[derive(Clone)]
pub struct TxQueueHandle {
    ring: Arc<ArrayQueue<Mbuf>>,
    counters: Arc<DevCounters>,
}

impl TxQueueHandle {
    /// Transmit as many packets as the ring accepts. Returns the number sent
    /// and the untransmitted remainder; the caller owns freeing those.
    pub fn tx_burst(&self, pkts: Vec<Mbuf>) -> (usize, Vec<Mbuf>) {
        let mut sent = 0;
        let mut unsent = Vec::new();
        let mut ring_full = false;

        for mbuf in pkts {
            if ring_full {
                unsent.push(mbuf);
                continue;
            }
            let len = mbuf.len() as u64;
            match self.ring.push(mbuf) {
                Ok(()) => {
                    self.counters.tx_packets.fetch_add(1, Ordering::Relaxed);
                    self.counters.tx_bytes.fetch_add(len, Ordering::Relaxed);
                    sent += 1;
                }
                Err(mbuf) => {
                    ring_full = true;
                    unsent.push(mbuf);
                }
            }
        }
        (sent, unsent)
    }
}
