// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A launched worker drains the wire-side RX ring into the TX ring and exits
//! cleanly on the stop flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dpdkd::config::{ConfigParser, ConfigValidator};
use dpdkd::eal::Eal;
use dpdkd::logging::LogRegistry;
use dpdkd::port::PortManager;
use dpdkd::worker::PmdThreadManager;

const FORWARDING_CONFIG: &str = r#"{"core_mask":"0x3",
    "ports":[{"port_id":0,"num_rx_queues":1,"num_tx_queues":1,
              "num_descriptors":128,"mbuf_pool_size":4096,"mbuf_size":2048}],
    "pmd_threads":[{"lcore_id":1,
        "rx_queues":[{"port_id":0,"queue_id":0}],
        "tx_queues":[{"port_id":0,"queue_id":0}],
        "processor":"simple_forwarding"}]}"#;

#[test]
fn worker_forwards_rx_to_tx() {
    const PACKETS: usize = 50;

    let logger = LogRegistry::new().logger();
    let config = ConfigParser::parse_str(FORWARDING_CONFIG).unwrap();
    ConfigValidator::validate(&config).unwrap();

    let eal = Eal::init(&config, logger.clone()).unwrap();

    let mut ports = PortManager::new(Arc::clone(&eal), logger.clone());
    ports.initialize_ports(&config.ports).unwrap();
    ports.start_all().unwrap();

    let thread_manager = PmdThreadManager::new(Arc::clone(&eal), logger);
    thread_manager.launch_all(&config.pmd_threads).unwrap();
    assert_eq!(thread_manager.lcore_ids(), vec![1]);

    let dev = eal.device(0).unwrap();
    let pool = ports.get_port(0).unwrap().pool().unwrap().clone();

    for i in 0..PACKETS {
        let mut mbuf = pool.alloc().expect("pool exhausted");
        mbuf.set_data(&[i as u8; 64]).unwrap();
        dev.inject_rx(0, mbuf).unwrap();
    }

    // The worker forwards asynchronously; collect from the wire side until
    // everything came through.
    let mut forwarded = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while forwarded.len() < PACKETS && Instant::now() < deadline {
        forwarded.extend(dev.collect_tx(0).unwrap());
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(forwarded.len(), PACKETS, "not all packets were forwarded");

    // Payload ordering and integrity survive the forwarding path.
    for (i, mbuf) in forwarded.iter().enumerate() {
        assert_eq!(mbuf.data(), &[i as u8; 64]);
    }

    let stats = ports.get_port(0).unwrap().stats().unwrap();
    assert_eq!(stats.rx_packets, PACKETS as u64);
    assert_eq!(stats.tx_packets, PACKETS as u64);
    assert_eq!(stats.rx_bytes, (PACKETS * 64) as u64);

    thread_manager.stop_all();
    thread_manager.wait_all().unwrap();

    // Buffers all returned to the pool once the forwarded mbufs drop.
    drop(forwarded);
    assert_eq!(pool.available(), pool.capacity());
}

#[test]
fn workers_stop_promptly_on_flag() {
    let logger = LogRegistry::new().logger();
    let config = ConfigParser::parse_str(FORWARDING_CONFIG).unwrap();

    let eal = Eal::init(&config, logger.clone()).unwrap();
    let mut ports = PortManager::new(Arc::clone(&eal), logger.clone());
    ports.initialize_ports(&config.ports).unwrap();
    ports.start_all().unwrap();

    let thread_manager = PmdThreadManager::new(eal, logger);
    thread_manager.launch_all(&config.pmd_threads).unwrap();

    let started = Instant::now();
    thread_manager.stop_all();
    thread_manager.wait_all().unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "workers took too long to observe the stop flag"
    );
}
