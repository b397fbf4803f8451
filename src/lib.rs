// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Control plane and worker orchestration for a user-space packet forwarder.
//!
//! The daemon decodes and validates a declarative JSON configuration, opens
//! ports, launches one pinned poll-mode worker per configured lcore, and runs
//! a single-threaded reactor on the main lcore serving a unix command socket.
//! Deferred memory reclamation between workers and the control plane goes
//! through a QSBR scheme fed by a wait-free MPSC queue.

pub mod config;
pub mod control;
pub mod eal;
pub mod error;
#[macro_use]
pub mod logging;
pub mod port;
pub mod processor;
pub mod rcu;
pub mod worker;

pub use config::{ConfigParser, ConfigPrinter, ConfigValidator, DpdkConfig};
pub use control::{ControlPlane, ControlPlaneConfig};
pub use error::{Error, Result};
