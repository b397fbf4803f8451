// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Line-rate drain-and-forward: every RX queue empties into the single TX
//! queue in bursts of up to 32 buffers; whatever the TX ring refuses is
//! freed.

use super::{PacketProcessor, QueueSet, WorkerRxQueue, WorkerTxQueue};
use crate::config::QueueAssignment;
use crate::eal::Mbuf;
use crate::error::{Error, Result};

const BATCH_SIZE: usize = 32;

pub struct SimpleForwarding {
    rx: Vec<WorkerRxQueue>,
    tx: WorkerTxQueue,
    batch: Vec<Mbuf>,
}

impl PacketProcessor for SimpleForwarding {
    fn check(_rx_queues: &[QueueAssignment], tx_queues: &[QueueAssignment]) -> Result<()> {
        if tx_queues.len() != 1 {
            return Err(Error::invalid_argument(format!(
                "simple_forwarding requires exactly 1 TX queue, but {} were assigned",
                tx_queues.len()
            )));
        }
        Ok(())
    }

    fn new(mut queues: QueueSet) -> Self {
        // check() enforced exactly one TX queue before launch.
        let tx = queues.tx.remove(0);
        Self {
            rx: queues.rx,
            tx,
            batch: Vec::with_capacity(BATCH_SIZE),
        }
    }

    fn process_one_iteration(&mut self) -> usize {
        let mut handled = 0;

        for rx in &self.rx {
            let received = rx.handle.rx_burst(&mut self.batch, BATCH_SIZE);
            if received == 0 {
                continue;
            }
            handled += received;

            let pkts = std::mem::take(&mut self.batch);
            let (_sent, mut unsent) = self.tx.handle.tx_burst(pkts);

            // Free untransmitted buffers and reuse the allocation.
            unsent.clear();
            self.batch = unsent;
        }

        handled
    }
}
