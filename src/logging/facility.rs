// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log facilities: one per subsystem of the daemon

use serde::{Deserialize, Serialize};

/// Subsystem that produced a log record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// Control-plane orchestrator and reactor
    ControlPlane = 0,
    /// Unix command socket server
    ControlSocket = 1,
    /// Configuration decode/validate
    Config = 2,
    /// Port initialization and lifecycle
    Port = 3,
    /// PMD worker threads and their manager
    Worker = 4,
    /// QSBR deferred reclamation
    Rcu = 5,
    /// Runtime layer (lcores, devices)
    Eal = 6,
    /// Test-only facility
    Test = 7,
}

impl Facility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::ControlPlane => "CONTROL",
            Facility::ControlSocket => "SOCKET",
            Facility::Config => "CONFIG",
            Facility::Port => "PORT",
            Facility::Worker => "WORKER",
            Facility::Rcu => "RCU",
            Facility::Eal => "EAL",
            Facility::Test => "TEST",
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
