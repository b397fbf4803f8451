// Lock-free logging for the daemon.
//
// Workers spin-poll and must never block, so records go through a wait-free
// MPSC ring; a background consumer thread formats them to stderr. Producers
// drop (and count) on overrun rather than wait.

mod consumer;
mod facility;
mod logger;
#[macro_use]
mod macros;
mod ring;
mod severity;

pub use consumer::{spawn_consumer, ConsumerHandle, LogSink, StderrSink};
pub use facility::Facility;
pub use logger::{LogRegistry, Logger};
pub use ring::{LogRecord, LogRing};
pub use severity::Severity;
