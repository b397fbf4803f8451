// SPDX-License-Identifier: Apache-2.0 OR MIT

//! QSBR-based deferred reclamation.
//!
//! Workers post reclamation items into a wait-free MPSC queue and report
//! quiescent states each loop iteration; the control plane drains the queue
//! on a 1 ms timer and invokes callbacks whose grace period has elapsed.

mod manager;
mod qsbr;
mod queue;

pub use manager::{RcuConfig, RcuManager, RcuRegistry, RcuWorkerHandle};
pub use qsbr::QsbrVariable;
pub use queue::{DeferredAction, DeferredWorkItem, MpscQueue};
