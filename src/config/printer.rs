// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration to JSON. Lossless for recognized fields; passthrough
//! parameters are emitted as an `additional_params` array of `[key, value]`
//! pairs preserving their order.

use serde_json::{json, Map, Value};

use super::DpdkConfig;

pub struct ConfigPrinter;

impl ConfigPrinter {
    /// Serialize `config` to JSON. `indent > 0` pretty-prints.
    pub fn to_json(config: &DpdkConfig, indent: usize) -> String {
        let mut root = Map::new();

        if let Some(mask) = &config.core_mask {
            root.insert("core_mask".to_string(), json!(mask));
        }
        if let Some(channels) = config.memory_channels {
            root.insert("memory_channels".to_string(), json!(channels));
        }
        if !config.pci_allowlist.is_empty() {
            root.insert("pci_allowlist".to_string(), json!(config.pci_allowlist));
        }
        if !config.pci_blocklist.is_empty() {
            root.insert("pci_blocklist".to_string(), json!(config.pci_blocklist));
        }
        if let Some(level) = config.log_level {
            root.insert("log_level".to_string(), json!(level));
        }
        if let Some(pages) = config.huge_pages {
            root.insert("huge_pages".to_string(), json!(pages));
        }

        if !config.ports.is_empty() {
            let ports: Vec<Value> = config
                .ports
                .iter()
                .map(|port| {
                    json!({
                        "port_id": port.port_id,
                        "num_rx_queues": port.num_rx_queues,
                        "num_tx_queues": port.num_tx_queues,
                        "num_descriptors": port.num_descriptors,
                        "mbuf_pool_size": port.mbuf_pool_size,
                        "mbuf_size": port.mbuf_size,
                    })
                })
                .collect();
            root.insert("ports".to_string(), Value::Array(ports));
        }

        if !config.pmd_threads.is_empty() {
            let threads: Vec<Value> = config
                .pmd_threads
                .iter()
                .map(|thread| {
                    let mut obj = Map::new();
                    obj.insert("lcore_id".to_string(), json!(thread.lcore_id));
                    if !thread.rx_queues.is_empty() {
                        obj.insert(
                            "rx_queues".to_string(),
                            queue_list(&thread.rx_queues),
                        );
                    }
                    if !thread.tx_queues.is_empty() {
                        obj.insert(
                            "tx_queues".to_string(),
                            queue_list(&thread.tx_queues),
                        );
                    }
                    if !thread.processor_name.is_empty() {
                        obj.insert("processor".to_string(), json!(thread.processor_name));
                    }
                    Value::Object(obj)
                })
                .collect();
            root.insert("pmd_threads".to_string(), Value::Array(threads));
        }

        if !config.additional_params.is_empty() {
            let params: Vec<Value> = config
                .additional_params
                .iter()
                .map(|(key, value)| json!([key, value]))
                .collect();
            root.insert("additional_params".to_string(), Value::Array(params));
        }

        let root = Value::Object(root);
        if indent > 0 {
            serde_json::to_string_pretty(&root).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(&root).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

fn queue_list(queues: &[super::QueueAssignment]) -> Value {
    Value::Array(
        queues
            .iter()
            .map(|q| json!({"port_id": q.port_id, "queue_id": q.queue_id}))
            .collect(),
    )
}
