// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end configuration scenarios: decode, validate, print, round-trip.

use dpdkd::config::{ConfigParser, ConfigPrinter, ConfigValidator, DpdkConfig};
use dpdkd::error::Error;

const VALID_PLAN: &str = r#"{"core_mask":"0xff","ports":[{"port_id":0,"num_rx_queues":4,"num_tx_queues":4,
  "num_descriptors":1024,"mbuf_pool_size":16384,"mbuf_size":2048}],
 "pmd_threads":[{"lcore_id":1,"rx_queues":[{"port_id":0,"queue_id":0}],
                 "tx_queues":[{"port_id":0,"queue_id":0}]}]}"#;

fn decode(content: &str) -> DpdkConfig {
    ConfigParser::parse_str(content).expect("decode failed")
}

#[test]
fn accepts_valid_worker_plan() {
    let config = decode(VALID_PLAN);
    assert!(ConfigValidator::validate(&config).is_ok());
}

#[test]
fn rejects_worker_on_main_lcore() {
    let content = VALID_PLAN.replace(r#""lcore_id":1"#, r#""lcore_id":0"#);
    let config = decode(&content);
    let err = ConfigValidator::validate(&config).unwrap_err();
    assert!(err.message().contains("main lcore"));
}

#[test]
fn rejects_out_of_range_queue() {
    let content = VALID_PLAN.replace(
        r#""rx_queues":[{"port_id":0,"queue_id":0}]"#,
        r#""rx_queues":[{"port_id":0,"queue_id":4}]"#,
    );
    let config = decode(&content);
    let err = ConfigValidator::validate(&config).unwrap_err();
    let msg = err.message();
    assert!(msg.contains("out of range"));
    assert!(msg.contains("port 0"));
}

#[test]
fn rejects_duplicate_queue_assignment() {
    let content = r#"{"core_mask":"0x07",
        "ports":[{"port_id":0,"num_rx_queues":4,"num_tx_queues":4,
                  "num_descriptors":1024,"mbuf_pool_size":16384,"mbuf_size":2048}],
        "pmd_threads":[
            {"lcore_id":1,"rx_queues":[{"port_id":0,"queue_id":0}]},
            {"lcore_id":2,"rx_queues":[{"port_id":0,"queue_id":0}]}]}"#;
    let config = decode(content);
    let err = ConfigValidator::validate(&config).unwrap_err();
    assert!(err.message().contains("Duplicate RX queue assignment"));
}

#[test]
fn round_trips_valid_plan() {
    let config = decode(VALID_PLAN);
    assert!(config.additional_params.is_empty());

    let printed = ConfigPrinter::to_json(&config, 2);
    let decoded = ConfigParser::parse_str(&printed).unwrap();
    assert_eq!(decoded, config);

    // Every recognized field is present in the printed form.
    for field in [
        "core_mask",
        "ports",
        "pmd_threads",
        "port_id",
        "num_rx_queues",
        "num_tx_queues",
        "num_descriptors",
        "mbuf_pool_size",
        "mbuf_size",
        "lcore_id",
        "rx_queues",
        "tx_queues",
    ] {
        assert!(printed.contains(field), "missing field '{}'", field);
    }
}

#[test]
fn round_trips_passthrough_params() {
    let content = r#"{"core_mask":"0x3","future_flag":"on","tuning":{"depth":8}}"#;
    let config = decode(content);
    assert_eq!(config.additional_params.len(), 2);

    let printed = ConfigPrinter::to_json(&config, 0);
    let decoded = ConfigParser::parse_str(&printed).unwrap();
    assert_eq!(decoded, config);
}

// Removing any port, worker, or list entry from an accepted config must not
// produce a decoding error; the result is accepted or rejected by validation.
#[test]
fn validator_is_monotonic_under_removals() {
    let content = r#"{"core_mask":"0x0f",
        "pci_allowlist":["0000:00:08.0","0000:00:09.0"],
        "ports":[
            {"port_id":0,"num_rx_queues":2,"num_tx_queues":2,
             "num_descriptors":512,"mbuf_pool_size":8192,"mbuf_size":2048},
            {"port_id":1,"num_rx_queues":1,"num_tx_queues":1,
             "num_descriptors":512,"mbuf_pool_size":8192,"mbuf_size":2048}],
        "pmd_threads":[
            {"lcore_id":1,"rx_queues":[{"port_id":0,"queue_id":0}],
                          "tx_queues":[{"port_id":0,"queue_id":0}]},
            {"lcore_id":2,"rx_queues":[{"port_id":1,"queue_id":0}],
                          "tx_queues":[{"port_id":1,"queue_id":0}]}]}"#;
    let config = decode(content);
    assert!(ConfigValidator::validate(&config).is_ok());

    let assert_validation_only = |modified: &DpdkConfig| {
        match ConfigValidator::validate(modified) {
            Ok(()) | Err(Error::InvalidArgument(_)) => {}
            Err(other) => panic!("expected validation outcome, got {}", other),
        }
        // The modified config still survives a print/decode cycle.
        let printed = ConfigPrinter::to_json(modified, 0);
        assert_eq!(&ConfigParser::parse_str(&printed).unwrap(), modified);
    };

    for index in 0..config.ports.len() {
        let mut modified = config.clone();
        modified.ports.remove(index);
        assert_validation_only(&modified);
    }
    for index in 0..config.pmd_threads.len() {
        let mut modified = config.clone();
        modified.pmd_threads.remove(index);
        assert_validation_only(&modified);
    }
    for index in 0..config.pci_allowlist.len() {
        let mut modified = config.clone();
        modified.pci_allowlist.remove(index);
        assert_validation_only(&modified);
    }
    // Dropping queue assignments from a worker entry.
    let mut modified = config.clone();
    modified.pmd_threads[0].rx_queues.clear();
    assert_validation_only(&modified);
}

// parse_coremask returns exactly the set-bit indices of the hex value.
#[test]
fn coremask_matches_bit_positions() {
    for mask in ["0xff", "0Xff", "ff", "0x5", "1", "8000000000000000", "0xdeadbeef"] {
        let digits = mask
            .strip_prefix("0x")
            .or_else(|| mask.strip_prefix("0X"))
            .unwrap_or(mask);
        let value = u64::from_str_radix(digits, 16).unwrap();
        let expected: std::collections::BTreeSet<u32> =
            (0..64).filter(|bit| value & (1u64 << bit) != 0).collect();

        assert_eq!(
            ConfigValidator::parse_coremask(Some(mask)),
            expected,
            "mask {}",
            mask
        );

        if !expected.is_empty() {
            assert_eq!(
                ConfigValidator::main_lcore(Some(mask)),
                *expected.iter().next().unwrap()
            );
        }
    }

    assert!(ConfigValidator::parse_coremask(Some("")).is_empty());
    assert!(ConfigValidator::parse_coremask(None).is_empty());
    assert_eq!(ConfigValidator::main_lcore(None), 0);
}

#[test]
fn parse_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dpdk.json");
    std::fs::write(&path, VALID_PLAN).unwrap();

    let config = ConfigParser::parse_file(&path).unwrap();
    assert_eq!(config, decode(VALID_PLAN));
}

#[test]
fn parse_file_rejects_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "").unwrap();

    let err = ConfigParser::parse_file(&path).unwrap_err();
    assert!(err.message().contains("empty"));
}
