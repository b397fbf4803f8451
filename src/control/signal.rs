// SPDX-License-Identifier: Apache-2.0 OR MIT

//! POSIX signal delivery into the reactor.
//!
//! SIGINT and SIGTERM both funnel into one asynchronous event. The first
//! delivery invokes the shutdown callback and the task exits; no further
//! signals are awaited, since shutdown is already in progress.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::ShutdownFn;
use crate::error::{Error, Result};
use crate::log_notice;
use crate::logging::{Facility, Logger};

pub struct SignalIntegration {
    logger: Logger,
    cancel_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SignalIntegration {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            cancel_tx: None,
            task: None,
        }
    }

    /// Register the handlers and start waiting. Must run inside the reactor.
    pub fn start(&mut self, on_signal: ShutdownFn) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::internal(format!("Failed to register SIGINT handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::internal(format!("Failed to register SIGTERM handler: {}", e)))?;

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let logger = self.logger.clone();

        self.task = Some(tokio::spawn(async move {
            let name = tokio::select! {
                _ = cancel_rx.changed() => return,
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };

            log_notice!(
                logger,
                Facility::ControlPlane,
                &format!("Received {}, initiating graceful shutdown", name)
            );
            on_signal();
        }));
        self.cancel_tx = Some(cancel_tx);

        Ok(())
    }

    /// Stop waiting for signals. Idempotent.
    pub fn stop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }
        self.task.take();
    }
}
