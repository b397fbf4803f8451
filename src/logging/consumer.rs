// SPDX-License-Identifier: Apache-2.0 OR MIT
// Background consumer draining the log ring to a sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::ring::{LogRecord, LogRing};
use super::LogRegistry;

const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

/// Destination for drained log records.
pub trait LogSink: Send {
    fn write_record(&mut self, record: &LogRecord);
}

/// Formats records as `[ts] SEVERITY FACILITY message` on stderr.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_record(&mut self, record: &LogRecord) {
        let secs = record.timestamp_ms / 1000;
        let millis = record.timestamp_ms % 1000;
        eprintln!(
            "[{}.{:03}] {:9} {:7} {}",
            secs,
            millis,
            record.severity.as_str(),
            record.facility.as_str(),
            record.message
        );
    }
}

/// Handle for the consumer thread; drains remaining records on stop.
pub struct ConsumerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn a thread that drains the registry's ring into `sink`.
pub fn spawn_consumer(registry: &LogRegistry, mut sink: impl LogSink + 'static) -> ConsumerHandle {
    let ring: Arc<LogRing> = registry.ring();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = std::thread::Builder::new()
        .name("log-consumer".to_string())
        .spawn(move || loop {
            while let Some(record) = ring.read() {
                sink.write_record(&record);
            }
            if stop_flag.load(Ordering::Relaxed) && ring.is_empty() {
                break;
            }
            std::thread::sleep(DRAIN_INTERVAL);
        })
        .expect("failed to spawn log consumer thread");

    ConsumerHandle {
        stop,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Facility;
    use std::sync::Mutex;

    struct CollectSink(Arc<Mutex<Vec<String>>>);

    impl LogSink for CollectSink {
        fn write_record(&mut self, record: &LogRecord) {
            self.0.lock().unwrap().push(record.message.clone());
        }
    }

    #[test]
    fn test_consumer_drains_ring_on_stop() {
        let registry = LogRegistry::with_capacity(64);
        let collected = Arc::new(Mutex::new(Vec::new()));
        let consumer = spawn_consumer(&registry, CollectSink(Arc::clone(&collected)));

        let logger = registry.logger();
        for i in 0..10 {
            logger.info(Facility::Test, &format!("msg{}", i));
        }
        consumer.stop();

        let collected = collected.lock().unwrap();
        assert_eq!(collected.len(), 10);
        assert_eq!(collected[0], "msg0");
        assert_eq!(collected[9], "msg9");
    }
}
