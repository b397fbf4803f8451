// Lock-free MPSC ring buffer carrying log records.
//
// Producers (workers, reactor tasks) reserve a slot with a CAS on the write
// sequence and publish it through a per-slot state machine, so the hot path
// never takes a lock and never blocks. A single consumer thread drains the
// ring and formats records to the sink. On overflow the oldest records are
// overwritten and counted, never awaited.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Facility, Severity};

/// Cache-aligned wrapper to prevent false sharing
#[repr(align(64))]
struct CacheAligned<T>(T);

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A single formatted log record.
#[derive(Debug)]
pub struct LogRecord {
    pub timestamp_ms: u64,
    pub sequence: u64,
    pub severity: Severity,
    pub facility: Facility,
    pub message: String,
}

impl LogRecord {
    pub fn new(severity: Severity, facility: Facility, message: String) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            sequence: 0,
            severity,
            facility,
            message,
        }
    }
}

struct Slot {
    state: AtomicU8,
    record: UnsafeCell<Option<LogRecord>>,
}

/// Lock-free multiple-producer single-consumer log ring.
pub struct LogRing {
    slots: Box<[Slot]>,
    capacity: usize,
    write_seq: CacheAligned<AtomicU64>,
    read_seq: CacheAligned<AtomicU64>,
    overruns: AtomicU64,
}

// SAFETY: producers coordinate via CAS on write_seq and own their reserved
// slot through the EMPTY -> WRITING -> READY state machine; only one thread
// reads. The UnsafeCell contents are only touched by the slot's current owner.
unsafe impl Send for LogRing {}
unsafe impl Sync for LogRing {}

impl LogRing {
    /// # Panics
    /// Panics if capacity is not a power of 2.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be power of 2");

        let slots: Vec<Slot> = (0..capacity)
            .map(|_| Slot {
                state: AtomicU8::new(EMPTY),
                record: UnsafeCell::new(None),
            })
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            capacity,
            write_seq: CacheAligned(AtomicU64::new(0)),
            read_seq: CacheAligned(AtomicU64::new(0)),
            overruns: AtomicU64::new(0),
        }
    }

    /// Write a record. Never blocks; overwrites (and counts) on overflow.
    pub fn write(&self, mut record: LogRecord) {
        let seq = loop {
            let current = self.write_seq.0.load(Ordering::Relaxed);
            match self.write_seq.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break current,
                Err(_) => std::hint::spin_loop(),
            }
        };

        let pos = (seq as usize) & (self.capacity - 1);

        let read_seq = self.read_seq.0.load(Ordering::Acquire);
        if seq >= read_seq + self.capacity as u64 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }

        record.sequence = seq;

        let slot = &self.slots[pos];
        slot.state.store(WRITING, Ordering::Release);
        // SAFETY: the CAS above gave this thread exclusive ownership of `pos`
        // for sequence `seq`; the state machine keeps the reader out until
        // READY is published.
        unsafe {
            *slot.record.get() = Some(record);
        }
        slot.state.store(READY, Ordering::Release);
    }

    /// Read one record. Single consumer only.
    pub fn read(&self) -> Option<LogRecord> {
        let read_seq = self.read_seq.0.load(Ordering::Relaxed);
        let write_seq = self.write_seq.0.load(Ordering::Acquire);

        if read_seq >= write_seq {
            return None;
        }

        let pos = (read_seq as usize) & (self.capacity - 1);
        let slot = &self.slots[pos];

        // A producer may have reserved the slot but not yet published it.
        let mut spins = 0;
        loop {
            if slot.state.load(Ordering::Acquire) == READY {
                break;
            }
            if spins > 1000 {
                return None;
            }
            spins += 1;
            std::hint::spin_loop();
        }

        // SAFETY: READY guarantees the producer's write completed; this is
        // the only reader.
        let record = unsafe { (*slot.record.get()).take() };

        slot.state.store(EMPTY, Ordering::Release);
        self.read_seq.0.fetch_add(1, Ordering::Release);

        record
    }

    /// Records dropped due to overflow.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        let write_seq = self.write_seq.0.load(Ordering::Relaxed);
        let read_seq = self.read_seq.0.load(Ordering::Relaxed);
        (write_seq.saturating_sub(read_seq) as usize).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_read_basic() {
        let ring = LogRing::new(4);

        ring.write(LogRecord::new(
            Severity::Info,
            Facility::Test,
            "first".to_string(),
        ));
        ring.write(LogRecord::new(
            Severity::Error,
            Facility::Test,
            "second".to_string(),
        ));

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.read().unwrap().message, "first");
        assert_eq!(ring.read().unwrap().message, "second");
        assert!(ring.is_empty());
        assert!(ring.read().is_none());
    }

    #[test]
    fn test_wraparound() {
        let ring = LogRing::new(4);

        for i in 0..4 {
            ring.write(LogRecord::new(
                Severity::Info,
                Facility::Test,
                format!("msg{}", i),
            ));
        }
        for i in 0..4 {
            assert_eq!(ring.read().unwrap().message, format!("msg{}", i));
        }

        ring.write(LogRecord::new(
            Severity::Info,
            Facility::Test,
            "wrap".to_string(),
        ));
        assert_eq!(ring.read().unwrap().message, "wrap");
    }

    #[test]
    fn test_overrun_counted() {
        let ring = LogRing::new(4);

        for i in 0..8 {
            ring.write(LogRecord::new(
                Severity::Info,
                Facility::Test,
                format!("msg{}", i),
            ));
        }

        assert_eq!(ring.overruns(), 4);
    }

    #[test]
    fn test_concurrent_writers() {
        let ring = Arc::new(LogRing::new(1024));
        let mut handles = vec![];

        for t in 0..4 {
            let ring = ring.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    ring.write(LogRecord::new(
                        Severity::Info,
                        Facility::Test,
                        format!("t{}m{}", t, i),
                    ));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while ring.read().is_some() {
            count += 1;
        }
        assert_eq!(count, 400);
    }
}
