// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON configuration decoder.
//!
//! The decoder walks a parsed [`serde_json::Value`] by hand instead of using
//! derive, because wrong-type and missing-field errors must name the exact
//! offending field, and unrecognized keys must be preserved verbatim as
//! passthrough parameters.

use std::path::Path;

use serde_json::{Map, Value};

use super::{DpdkConfig, DpdkPortConfig, PmdThreadConfig, QueueAssignment};
use crate::error::{Error, Result};

/// Top-level keys the decoder consumes; everything else is passthrough.
const KNOWN_FIELDS: &[&str] = &[
    "core_mask",
    "memory_channels",
    "pci_allowlist",
    "pci_blocklist",
    "log_level",
    "huge_pages",
    "ports",
    "pmd_threads",
    "additional_params",
];

pub struct ConfigParser;

impl ConfigParser {
    /// Parse the JSON configuration file at `path`.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<DpdkConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!(
                    "Configuration file not found: {}",
                    path.display()
                ))
            } else {
                Error::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if content.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Configuration file is empty: {}",
                path.display()
            )));
        }

        Self::parse_str(&content)
    }

    /// Parse a JSON configuration from a string.
    pub fn parse_str(content: &str) -> Result<DpdkConfig> {
        if content.is_empty() {
            return Err(Error::invalid_argument("Configuration content is empty"));
        }

        let root: Value = serde_json::from_str(content).map_err(|e| {
            let offset = byte_offset(content, e.line(), e.column());
            Error::invalid_argument(format!("JSON parse error at byte {}: {}", offset, e))
        })?;

        let obj = root
            .as_object()
            .ok_or_else(|| Error::invalid_argument("Configuration must be a JSON object"))?;

        let mut config = DpdkConfig::default();

        if let Some(value) = obj.get("core_mask") {
            config.core_mask = Some(
                value
                    .as_str()
                    .ok_or_else(|| Error::invalid_argument("Field 'core_mask' must be a string"))?
                    .to_string(),
            );
        }

        if let Some(value) = obj.get("memory_channels") {
            config.memory_channels = Some(require_integer("memory_channels", value)?);
        }

        if let Some(value) = obj.get("pci_allowlist") {
            config.pci_allowlist = parse_string_list("pci_allowlist", value)?;
        }

        if let Some(value) = obj.get("pci_blocklist") {
            config.pci_blocklist = parse_string_list("pci_blocklist", value)?;
        }

        if let Some(value) = obj.get("log_level") {
            config.log_level = Some(require_integer("log_level", value)?);
        }

        if let Some(value) = obj.get("huge_pages") {
            config.huge_pages = Some(require_integer("huge_pages", value)?);
        }

        if let Some(value) = obj.get("ports") {
            let entries = value
                .as_array()
                .ok_or_else(|| Error::invalid_argument("Field 'ports' must be an array"))?;
            for entry in entries {
                config.ports.push(parse_port_entry(entry)?);
            }
        }

        if let Some(value) = obj.get("pmd_threads") {
            let entries = value
                .as_array()
                .ok_or_else(|| Error::invalid_argument("Field 'pmd_threads' must be an array"))?;
            for entry in entries {
                config.pmd_threads.push(parse_pmd_entry(entry)?);
            }
        }

        // Passthrough re-emitted by the printer; accept it back so decoding a
        // printed configuration reproduces the original.
        if let Some(value) = obj.get("additional_params") {
            parse_additional_params(value, &mut config.additional_params)?;
        }

        for (key, value) in obj {
            if KNOWN_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let literal = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            config.additional_params.push((key.clone(), literal));
        }

        Ok(config)
    }
}

fn parse_port_entry(entry: &Value) -> Result<DpdkPortConfig> {
    let obj = entry
        .as_object()
        .ok_or_else(|| Error::invalid_argument("Each port entry must be a JSON object"))?;

    Ok(DpdkPortConfig {
        port_id: require_u16(obj, "port_id", "Port entry")?,
        num_rx_queues: require_u16(obj, "num_rx_queues", "Port entry")?,
        num_tx_queues: require_u16(obj, "num_tx_queues", "Port entry")?,
        num_descriptors: require_u16(obj, "num_descriptors", "Port entry")?,
        mbuf_pool_size: require_u32(obj, "mbuf_pool_size", "Port entry")?,
        mbuf_size: require_u16(obj, "mbuf_size", "Port entry")?,
    })
}

fn parse_pmd_entry(entry: &Value) -> Result<PmdThreadConfig> {
    let obj = entry
        .as_object()
        .ok_or_else(|| Error::invalid_argument("Each PMD thread entry must be a JSON object"))?;

    let lcore_id = require_u32(obj, "lcore_id", "PMD thread entry")?;

    let mut thread = PmdThreadConfig {
        lcore_id,
        ..Default::default()
    };

    if let Some(value) = obj.get("rx_queues") {
        thread.rx_queues = parse_queue_list("rx_queues", value)?;
    }
    if let Some(value) = obj.get("tx_queues") {
        thread.tx_queues = parse_queue_list("tx_queues", value)?;
    }
    if let Some(value) = obj.get("processor") {
        thread.processor_name = value
            .as_str()
            .ok_or_else(|| Error::invalid_argument("Field 'processor' must be a string"))?
            .to_string();
    }

    Ok(thread)
}

fn parse_queue_list(field: &str, value: &Value) -> Result<Vec<QueueAssignment>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::invalid_argument(format!("Field '{}' must be an array", field)))?;

    let mut queues = Vec::with_capacity(entries.len());
    for entry in entries {
        let obj = entry
            .as_object()
            .ok_or_else(|| Error::invalid_argument("Each queue assignment must be a JSON object"))?;
        queues.push(QueueAssignment {
            port_id: require_u16(obj, "port_id", "Queue assignment")?,
            queue_id: require_u16(obj, "queue_id", "Queue assignment")?,
        });
    }
    Ok(queues)
}

fn parse_string_list(field: &str, value: &Value) -> Result<Vec<String>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::invalid_argument(format!("Field '{}' must be an array", field)))?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        out.push(
            entry
                .as_str()
                .ok_or_else(|| {
                    Error::invalid_argument(format!("All elements in '{}' must be strings", field))
                })?
                .to_string(),
        );
    }
    Ok(out)
}

fn parse_additional_params(value: &Value, params: &mut Vec<(String, String)>) -> Result<()> {
    let pairs = value.as_array().ok_or_else(|| {
        Error::invalid_argument("Field 'additional_params' must be an array of [key, value] pairs")
    })?;

    for pair in pairs {
        let elements = pair.as_array().filter(|a| a.len() == 2);
        let (key, literal) = match elements {
            Some(a) => match (a[0].as_str(), a[1].as_str()) {
                (Some(k), Some(v)) => (k.to_string(), v.to_string()),
                _ => {
                    return Err(Error::invalid_argument(
                        "Field 'additional_params' must be an array of [key, value] pairs",
                    ))
                }
            },
            None => {
                return Err(Error::invalid_argument(
                    "Field 'additional_params' must be an array of [key, value] pairs",
                ))
            }
        };
        params.push((key, literal));
    }
    Ok(())
}

fn require_integer(field: &str, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::invalid_argument(format!("Field '{}' must be an integer", field)))
}

fn require_u64(obj: &Map<String, Value>, field: &str, entry: &str) -> Result<u64> {
    let value = obj.get(field).ok_or_else(|| {
        Error::invalid_argument(format!("{} missing required field: {}", entry, field))
    })?;
    value.as_u64().ok_or_else(|| {
        Error::invalid_argument(format!("Field '{}' must be an unsigned integer", field))
    })
}

fn require_u16(obj: &Map<String, Value>, field: &str, entry: &str) -> Result<u16> {
    let value = require_u64(obj, field, entry)?;
    u16::try_from(value).map_err(|_| {
        Error::invalid_argument(format!("Field '{}' value {} is out of range", field, value))
    })
}

fn require_u32(obj: &Map<String, Value>, field: &str, entry: &str) -> Result<u32> {
    let value = require_u64(obj, field, entry)?;
    u32::try_from(value).map_err(|_| {
        Error::invalid_argument(format!("Field '{}' value {} is out of range", field, value))
    })
}

/// serde_json reports line/column; the error contract wants a byte offset.
pub(crate) fn byte_offset(content: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut offset = 0;
    for (idx, text) in content.split('\n').enumerate() {
        if idx + 1 == line {
            return offset + column.saturating_sub(1).min(text.len());
        }
        offset += text.len() + 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_object() {
        let config = ConfigParser::parse_str("{}").unwrap();
        assert_eq!(config, DpdkConfig::default());
    }

    #[test]
    fn test_parse_global_fields() {
        let config = ConfigParser::parse_str(
            r#"{
                "core_mask": "0xff",
                "memory_channels": 4,
                "pci_allowlist": ["0000:00:08.0"],
                "pci_blocklist": ["0000:00:09.0"],
                "log_level": 7,
                "huge_pages": 1024
            }"#,
        )
        .unwrap();

        assert_eq!(config.core_mask.as_deref(), Some("0xff"));
        assert_eq!(config.memory_channels, Some(4));
        assert_eq!(config.pci_allowlist, vec!["0000:00:08.0"]);
        assert_eq!(config.pci_blocklist, vec!["0000:00:09.0"]);
        assert_eq!(config.log_level, Some(7));
        assert_eq!(config.huge_pages, Some(1024));
    }

    #[test]
    fn test_parse_empty_content() {
        let err = ConfigParser::parse_str("").unwrap_err();
        assert!(err.message().contains("Configuration content is empty"));
    }

    #[test]
    fn test_parse_non_object_root() {
        let err = ConfigParser::parse_str("[1, 2]").unwrap_err();
        assert!(err.message().contains("must be a JSON object"));
    }

    #[test]
    fn test_parse_syntax_error_reports_byte_offset() {
        let err = ConfigParser::parse_str("{\"core_mask\": }").unwrap_err();
        assert!(err.message().contains("JSON parse error at byte"));
    }

    #[test]
    fn test_parse_wrong_type_core_mask() {
        let err = ConfigParser::parse_str(r#"{"core_mask": 255}"#).unwrap_err();
        assert!(err.message().contains("Field 'core_mask' must be a string"));
    }

    #[test]
    fn test_parse_wrong_type_memory_channels() {
        let err = ConfigParser::parse_str(r#"{"memory_channels": "four"}"#).unwrap_err();
        assert!(err
            .message()
            .contains("Field 'memory_channels' must be an integer"));
    }

    #[test]
    fn test_parse_allowlist_element_type() {
        let err = ConfigParser::parse_str(r#"{"pci_allowlist": [42]}"#).unwrap_err();
        assert!(err
            .message()
            .contains("All elements in 'pci_allowlist' must be strings"));
    }

    #[test]
    fn test_parse_port_entry() {
        let config = ConfigParser::parse_str(
            r#"{"ports": [{"port_id": 0, "num_rx_queues": 4, "num_tx_queues": 4,
                "num_descriptors": 1024, "mbuf_pool_size": 16384, "mbuf_size": 2048}]}"#,
        )
        .unwrap();

        assert_eq!(config.ports.len(), 1);
        let port = &config.ports[0];
        assert_eq!(port.port_id, 0);
        assert_eq!(port.num_rx_queues, 4);
        assert_eq!(port.num_descriptors, 1024);
        assert_eq!(port.mbuf_pool_size, 16384);
        assert_eq!(port.mbuf_size, 2048);
    }

    #[test]
    fn test_parse_port_missing_field() {
        let err = ConfigParser::parse_str(r#"{"ports": [{"port_id": 0}]}"#).unwrap_err();
        assert!(err
            .message()
            .contains("missing required field: num_rx_queues"));
    }

    #[test]
    fn test_parse_pmd_thread_full() {
        let config = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 2,
                "rx_queues": [{"port_id": 0, "queue_id": 0}, {"port_id": 0, "queue_id": 1}],
                "tx_queues": [{"port_id": 0, "queue_id": 0}],
                "processor": "simple_forwarding"}]}"#,
        )
        .unwrap();

        assert_eq!(config.pmd_threads.len(), 1);
        let thread = &config.pmd_threads[0];
        assert_eq!(thread.lcore_id, 2);
        assert_eq!(thread.rx_queues.len(), 2);
        assert_eq!(thread.rx_queues[1].queue_id, 1);
        assert_eq!(thread.tx_queues.len(), 1);
        assert_eq!(thread.processor_name, "simple_forwarding");
    }

    #[test]
    fn test_parse_pmd_thread_missing_lcore() {
        let err = ConfigParser::parse_str(r#"{"pmd_threads": [{"rx_queues": []}]}"#).unwrap_err();
        assert!(err.message().contains("missing required field: lcore_id"));
    }

    #[test]
    fn test_parse_pmd_thread_lcore_wrong_type() {
        let err =
            ConfigParser::parse_str(r#"{"pmd_threads": [{"lcore_id": "one"}]}"#).unwrap_err();
        assert!(err.message().contains("must be an unsigned integer"));
    }

    #[test]
    fn test_parse_queue_missing_port_id() {
        let err = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 1, "rx_queues": [{"queue_id": 0}]}]}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("missing required field: port_id"));
    }

    #[test]
    fn test_parse_queue_missing_queue_id() {
        let err = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 1, "rx_queues": [{"port_id": 0}]}]}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("missing required field: queue_id"));
    }

    #[test]
    fn test_parse_rx_queues_not_array() {
        let err = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 1, "rx_queues": "invalid"}]}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("Field 'rx_queues' must be an array"));
    }

    #[test]
    fn test_parse_port_id_out_of_range() {
        let err = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 1, "rx_queues": [{"port_id": 70000, "queue_id": 0}]}]}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("out of range"));
    }

    #[test]
    fn test_passthrough_preserves_unknown_keys() {
        let config = ConfigParser::parse_str(
            r#"{"core_mask": "0xff", "custom_flag": "yes", "custom_obj": {"a": 1}}"#,
        )
        .unwrap();

        assert_eq!(config.additional_params.len(), 2);
        assert_eq!(
            config.additional_params[0],
            ("custom_flag".to_string(), "yes".to_string())
        );
        assert_eq!(config.additional_params[1].0, "custom_obj");
        assert_eq!(config.additional_params[1].1, r#"{"a":1}"#);
    }

    #[test]
    fn test_pmd_threads_not_in_passthrough() {
        let config = ConfigParser::parse_str(
            r#"{"pmd_threads": [{"lcore_id": 1}], "custom_field": "custom_value"}"#,
        )
        .unwrap();

        assert_eq!(config.pmd_threads.len(), 1);
        assert_eq!(config.additional_params.len(), 1);
        assert_eq!(config.additional_params[0].0, "custom_field");
    }

    #[test]
    fn test_parse_file_not_found() {
        let err = ConfigParser::parse_file("/nonexistent/dpdk.json").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_byte_offset_multiline() {
        let content = "{\n  \"a\": }";
        // Line 2, column 8 lands on the '}'.
        assert_eq!(byte_offset(content, 2, 8), 9);
    }
}
