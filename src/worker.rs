// SPDX-License-Identifier: Apache-2.0 OR MIT

//! PMD worker lifecycle management.
//!
//! Launches one pinned poll-mode worker per configured lcore, shares a single
//! stop flag across all of them, and joins them on shutdown. The stop flag is
//! stored with release ordering and loaded relaxed by workers: no data is
//! published through it, and "stop eventually" is the only requirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::PmdThreadConfig;
use crate::eal::Eal;
use crate::error::{Error, Result};
use crate::processor::{self, QueueSet, WorkerRun, WorkerRxQueue, WorkerTxQueue};
use crate::rcu::RcuRegistry;
use crate::{log_debug, log_notice};
use crate::logging::{Facility, Logger};

struct WorkerRecord {
    processor_name: String,
    rcu_registered: bool,
}

/// Owns the worker map and the shared stop flag.
pub struct PmdThreadManager {
    eal: Arc<Eal>,
    logger: Logger,
    stop_flag: Arc<AtomicBool>,
    threads: Mutex<HashMap<u32, WorkerRecord>>,
    rcu: Mutex<Option<RcuRegistry>>,
}

impl PmdThreadManager {
    pub fn new(eal: Arc<Eal>, logger: Logger) -> Self {
        Self {
            eal,
            logger,
            stop_flag: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(HashMap::new()),
            rcu: Mutex::new(None),
        }
    }

    pub fn eal(&self) -> &Arc<Eal> {
        &self.eal
    }

    /// Wire a QSBR registry in. Worker cores launched afterwards register
    /// with it and report quiescent states from their loops.
    pub fn set_rcu_registry(&self, registry: RcuRegistry) {
        *self.rcu.lock().unwrap() = Some(registry);
    }

    /// Launch every configured worker. Entries on the main lcore are skipped
    /// (the validator already rejects them; this is defense in depth). On a
    /// launch failure, earlier workers keep running and are joined later by
    /// the shutdown path.
    pub fn launch_all(&self, configs: &[PmdThreadConfig]) -> Result<()> {
        if configs.is_empty() {
            return Ok(());
        }

        self.stop_flag.store(false, Ordering::Release);
        self.threads.lock().unwrap().clear();

        let main_lcore = self.eal.main_lcore();

        for config in configs {
            let lcore_id = config.lcore_id;

            if lcore_id == main_lcore {
                log_debug!(
                    self.logger,
                    Facility::Worker,
                    &format!("skipping lcore {} (main/control plane)", lcore_id)
                );
                continue;
            }

            let processor_name = if config.processor_name.is_empty() {
                processor::DEFAULT_PROCESSOR_NAME
            } else {
                config.processor_name.as_str()
            };

            let entry = processor::lookup(processor_name)?;

            (entry.checker)(&config.rx_queues, &config.tx_queues).map_err(|e| {
                Error::invalid_argument(format!(
                    "PMD thread on lcore {}: processor '{}' check failed: {}",
                    lcore_id,
                    processor_name,
                    e.message()
                ))
            })?;

            let queues = self.resolve_queues(config)?;

            let (rcu_handle, rcu_registered) = {
                let rcu = self.rcu.lock().unwrap();
                match rcu.as_ref() {
                    Some(registry) => {
                        registry.register_thread(lcore_id)?;
                        (Some(registry.worker_handle(lcore_id)), true)
                    }
                    None => (None, false),
                }
            };

            let run = WorkerRun {
                lcore_id,
                queues,
                stop_flag: Arc::clone(&self.stop_flag),
                rcu: rcu_handle,
            };

            let launcher = entry.launcher;
            self.eal
                .remote_launch(lcore_id, move || launcher(run))
                .map_err(|e| {
                    Error::internal(format!(
                        "Failed to launch PMD thread on lcore {}: {}",
                        lcore_id,
                        e.message()
                    ))
                })?;

            log_notice!(
                self.logger,
                Facility::Worker,
                &format!(
                    "PMD thread launched on lcore {} (processor '{}', {} rx / {} tx queues)",
                    lcore_id,
                    processor_name,
                    config.rx_queues.len(),
                    config.tx_queues.len()
                )
            );

            self.threads.lock().unwrap().insert(
                lcore_id,
                WorkerRecord {
                    processor_name: processor_name.to_string(),
                    rcu_registered,
                },
            );
        }

        Ok(())
    }

    /// Signal every worker to stop.
    pub fn stop_all(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Block until every launched worker has returned. Worker cores are
    /// unregistered from the QSBR manager as they come back. Returns the
    /// first non-zero exit.
    pub fn wait_all(&self) -> Result<()> {
        let entries: Vec<(u32, bool)> = {
            let threads = self.threads.lock().unwrap();
            let mut entries: Vec<(u32, bool)> = threads
                .iter()
                .map(|(&lcore_id, record)| (lcore_id, record.rcu_registered))
                .collect();
            entries.sort_unstable();
            entries
        };

        let mut first_failure = None;

        for (lcore_id, rcu_registered) in entries {
            let exit_code = self.eal.wait_lcore(lcore_id);

            if rcu_registered {
                if let Some(registry) = self.rcu.lock().unwrap().as_ref() {
                    if let Err(e) = registry.unregister_thread(lcore_id) {
                        self.logger.warning(
                            Facility::Worker,
                            &format!(
                                "could not unregister lcore {} from QSBR: {}",
                                lcore_id,
                                e.message()
                            ),
                        );
                    }
                }
            }

            if exit_code != 0 && first_failure.is_none() {
                first_failure = Some(Error::internal(format!(
                    "PMD thread on lcore {} returned error: {}",
                    lcore_id, exit_code
                )));
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    /// Lcore IDs of all launched workers, ascending.
    pub fn lcore_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.threads.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn processor_name(&self, lcore_id: u32) -> Option<String> {
        self.threads
            .lock()
            .unwrap()
            .get(&lcore_id)
            .map(|record| record.processor_name.clone())
    }

    fn resolve_queues(&self, config: &PmdThreadConfig) -> Result<QueueSet> {
        let mut rx = Vec::with_capacity(config.rx_queues.len());
        for assignment in &config.rx_queues {
            let dev = self.eal.device(assignment.port_id).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "PMD thread on lcore {}: unknown port {}",
                    config.lcore_id, assignment.port_id
                ))
            })?;
            let handle = dev.rx_queue(assignment.queue_id).map_err(|e| {
                Error::failed_precondition(format!(
                    "PMD thread on lcore {}: {}",
                    config.lcore_id,
                    e.message()
                ))
            })?;
            rx.push(WorkerRxQueue {
                assignment: *assignment,
                handle,
            });
        }

        let mut tx = Vec::with_capacity(config.tx_queues.len());
        for assignment in &config.tx_queues {
            let dev = self.eal.device(assignment.port_id).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "PMD thread on lcore {}: unknown port {}",
                    config.lcore_id, assignment.port_id
                ))
            })?;
            let handle = dev.tx_queue(assignment.queue_id).map_err(|e| {
                Error::failed_precondition(format!(
                    "PMD thread on lcore {}: {}",
                    config.lcore_id,
                    e.message()
                ))
            })?;
            tx.push(WorkerTxQueue {
                assignment: *assignment,
                handle,
            });
        }

        Ok(QueueSet { rx, tx })
    }
}
