// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle and registry over the shared log ring

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::ring::{LogRecord, LogRing};
use super::{Facility, Severity};

const DEFAULT_RING_CAPACITY: usize = 4096;

/// Lightweight, cloneable handle for writing log records.
///
/// The ring and the minimum-level filter are shared; dropping below the
/// filter costs one relaxed atomic load and no allocation.
#[derive(Clone)]
pub struct Logger {
    ring: Arc<LogRing>,
    min_level: Arc<AtomicU8>,
}

impl Logger {
    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if severity.as_u8() > self.min_level.load(Ordering::Relaxed) {
            return;
        }
        self.ring
            .write(LogRecord::new(severity, facility, message.to_string()));
    }

    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }
}

/// Owns the shared ring and the global minimum severity.
pub struct LogRegistry {
    ring: Arc<LogRing>,
    min_level: Arc<AtomicU8>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Arc::new(LogRing::new(capacity)),
            min_level: Arc::new(AtomicU8::new(Severity::Info.as_u8())),
        }
    }

    pub fn logger(&self) -> Logger {
        Logger {
            ring: Arc::clone(&self.ring),
            min_level: Arc::clone(&self.min_level),
        }
    }

    pub fn set_min_level(&self, level: Severity) {
        self.min_level.store(level.as_u8(), Ordering::Relaxed);
    }

    pub(super) fn ring(&self) -> Arc<LogRing> {
        Arc::clone(&self.ring)
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}
