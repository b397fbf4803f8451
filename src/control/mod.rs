// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Control-plane orchestrator.
//!
//! Runs on the main lcore inside a single-threaded reactor and multiplexes
//! the unix command listener, POSIX signal delivery and the QSBR poll timer.
//! Shutdown, whether triggered by a command, a signal or a fatal condition,
//! proceeds through a fixed sequence with a bounded wait for the workers.

mod command;
mod server;
mod signal;

pub use command::CommandHandler;
pub use server::UnixSocketServer;
pub use signal::SignalIntegration;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::eal::Eal;
use crate::error::{Error, Result};
use crate::rcu::{RcuConfig, RcuManager};
use crate::worker::PmdThreadManager;
use crate::{log_info, log_notice, log_warning};
use crate::logging::{Facility, Logger};

/// Shutdown trigger shared with the command handler and signal integration.
/// Invocations are idempotent, so concurrent triggers are benign.
pub type ShutdownFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub socket_path: PathBuf,
    pub shutdown_timeout_seconds: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/dpdk_control.sock"),
            shutdown_timeout_seconds: 10,
        }
    }
}

pub struct ControlPlane {
    thread_manager: Arc<PmdThreadManager>,
    logger: Logger,
    config: ControlPlaneConfig,
    runtime: Option<tokio::runtime::Runtime>,
    rcu_manager: Option<RcuManager>,
    command_handler: Option<Arc<CommandHandler>>,
    socket_server: Option<UnixSocketServer>,
    signals: Option<SignalIntegration>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    initialized: bool,
}

impl ControlPlane {
    pub fn new(thread_manager: Arc<PmdThreadManager>, logger: Logger) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            thread_manager,
            logger,
            config: ControlPlaneConfig::default(),
            runtime: None,
            rcu_manager: None,
            command_handler: None,
            socket_server: None,
            signals: None,
            shutdown_tx,
            shutdown_rx,
            initialized: false,
        }
    }

    /// Set up the reactor and wire the QSBR manager into the worker manager.
    /// Refuses to run anywhere but the main lcore.
    pub fn initialize(&mut self, config: ControlPlaneConfig) -> Result<()> {
        if self.initialized {
            return Err(Error::failed_precondition(
                "ControlPlane is already initialized",
            ));
        }

        let main_lcore = self.thread_manager.eal().main_lcore();
        let current_lcore = Eal::current_lcore();
        if current_lcore != main_lcore {
            return Err(Error::failed_precondition(format!(
                "ControlPlane must be initialized on main lcore ({}), but running on lcore {}",
                main_lcore, current_lcore
            )));
        }

        check_socket_dir(&config.socket_path)?;

        // Single-threaded cooperative reactor: every task stays on the main
        // core; workers never share it.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| Error::internal(format!("Failed to build reactor: {}", e)))?;

        let mut rcu_manager = RcuManager::new();
        rcu_manager.init(RcuConfig::default())?;
        self.thread_manager
            .set_rcu_registry(rcu_manager.registry()?);

        let command_handler = Arc::new(CommandHandler::new(
            Arc::clone(&self.thread_manager),
            self.shutdown_fn(),
        ));
        let socket_server =
            UnixSocketServer::new(config.socket_path.clone(), self.logger.clone());
        let signals = SignalIntegration::new(self.logger.clone());

        log_notice!(
            self.logger,
            Facility::ControlPlane,
            &format!("ControlPlane initialized on lcore {}", main_lcore)
        );

        self.config = config;
        self.runtime = Some(runtime);
        self.rcu_manager = Some(rcu_manager);
        self.command_handler = Some(command_handler);
        self.socket_server = Some(socket_server);
        self.signals = Some(signals);
        self.initialized = true;
        Ok(())
    }

    /// Run the event loop until shutdown completes.
    pub fn run(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::failed_precondition(
                "ControlPlane not initialized. Call initialize() first.",
            ));
        }

        let runtime = self
            .runtime
            .take()
            .ok_or_else(|| Error::failed_precondition("ControlPlane already ran"))?;
        let mut rcu_manager = self
            .rcu_manager
            .take()
            .ok_or_else(|| Error::failed_precondition("ControlPlane already ran"))?;
        let command_handler = self
            .command_handler
            .clone()
            .ok_or_else(|| Error::failed_precondition("ControlPlane already ran"))?;
        let mut server = self
            .socket_server
            .take()
            .ok_or_else(|| Error::failed_precondition("ControlPlane already ran"))?;
        let mut signals = self
            .signals
            .take()
            .ok_or_else(|| Error::failed_precondition("ControlPlane already ran"))?;
        let mut shutdown_rx = self.shutdown_rx.clone();

        let result = runtime.block_on(async {
            signals.start(self.shutdown_fn())?;
            server.start(command_handler)?;

            rcu_manager.start()?;

            log_info!(
                self.logger,
                Facility::ControlPlane,
                "ControlPlane running, event loop started"
            );

            let mut poll =
                tokio::time::interval(Duration::from_millis(rcu_manager.poll_interval_ms()));
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        let _ = changed;
                        break;
                    }
                    _ = poll.tick() => {
                        rcu_manager.poll_tick();
                    }
                }
            }

            log_info!(
                self.logger,
                Facility::ControlPlane,
                "ControlPlane shutdown initiated"
            );

            // The order below is load-bearing; see the shutdown contract.
            server.stop().await;
            signals.stop();
            rcu_manager.stop();
            self.thread_manager.stop_all();
            self.join_workers_with_deadline().await;

            Ok(())
        });

        // Abandoned join tasks must not block reactor teardown.
        runtime.shutdown_background();

        log_info!(
            self.logger,
            Facility::ControlPlane,
            "ControlPlane event loop stopped"
        );
        result
    }

    /// Initiate graceful shutdown. Idempotent; safe from handlers that the
    /// orchestrator itself owns.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn shutdown_fn(&self) -> ShutdownFn {
        let shutdown_tx = self.shutdown_tx.clone();
        Arc::new(move || {
            let _ = shutdown_tx.send(true);
        })
    }

    async fn join_workers_with_deadline(&self) {
        let timeout = Duration::from_secs(self.config.shutdown_timeout_seconds);
        let thread_manager = Arc::clone(&self.thread_manager);
        let join = tokio::task::spawn_blocking(move || thread_manager.wait_all());

        match tokio::time::timeout(timeout, join).await {
            Err(_elapsed) => {
                log_warning!(
                    self.logger,
                    Facility::ControlPlane,
                    &format!(
                        "Shutdown timeout exceeded: PMD threads did not stop within {} seconds",
                        self.config.shutdown_timeout_seconds
                    )
                );
            }
            Ok(Err(join_error)) => {
                self.logger.error(
                    Facility::ControlPlane,
                    &format!("Worker join task failed: {}", join_error),
                );
            }
            Ok(Ok(Err(e))) => {
                self.logger.error(
                    Facility::ControlPlane,
                    &format!("Error waiting for PMD threads: {}", e.message()),
                );
            }
            Ok(Ok(Ok(()))) => {
                log_info!(
                    self.logger,
                    Facility::ControlPlane,
                    "All PMD threads stopped"
                );
            }
        }
    }
}

fn check_socket_dir(socket_path: &Path) -> Result<()> {
    let dir = match socket_path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => Path::new("."),
    };

    let metadata = std::fs::metadata(dir).map_err(|_| {
        Error::invalid_argument(format!(
            "Socket path directory does not exist: {}",
            dir.display()
        ))
    })?;

    if !metadata.is_dir() {
        return Err(Error::invalid_argument(format!(
            "Socket path parent is not a directory: {}",
            dir.display()
        )));
    }

    nix::unistd::access(dir, nix::unistd::AccessFlags::W_OK).map_err(|_| {
        Error::invalid_argument(format!(
            "Socket path directory is not writable: {}",
            dir.display()
        ))
    })?;

    Ok(())
}
