// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use dpdkd::config::{ConfigParser, ConfigPrinter, ConfigValidator};
use dpdkd::control::{ControlPlane, ControlPlaneConfig};
use dpdkd::eal::Eal;
use dpdkd::log_warning;
use dpdkd::logging::{spawn_consumer, Facility, LogRegistry, Severity, StderrSink};
use dpdkd::port::PortManager;
use dpdkd::worker::PmdThreadManager;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(long)]
    verbose: bool,

    /// Path to JSON configuration file
    #[arg(short = 'i', long = "config")]
    config: Option<PathBuf>,

    /// Path to the Unix socket for command and control
    #[arg(
        long = "socket_path",
        alias = "socket-path",
        default_value = "/tmp/dpdk_control.sock"
    )]
    socket_path: PathBuf,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("dpdkd: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let registry = LogRegistry::new();
    if args.verbose {
        registry.set_min_level(Severity::Debug);
    }
    let log_consumer = spawn_consumer(&registry, StderrSink);
    let logger = registry.logger();

    let config_path = args
        .config
        .context("a configuration file is required (-i <path>)")?;

    let config = ConfigParser::parse_file(&config_path).context("Configuration error")?;
    ConfigValidator::validate(&config).context("Validation error")?;

    if args.verbose {
        println!("Loaded configuration:");
        println!("{}", ConfigPrinter::to_json(&config, 2));
    }

    let eal = Eal::init(&config, logger.clone()).context("Runtime initialization error")?;

    let mut ports = PortManager::new(Arc::clone(&eal), logger.clone());
    ports
        .initialize_ports(&config.ports)
        .context("Port initialization error")?;
    ports.start_all().context("Port start error")?;

    let thread_manager = Arc::new(PmdThreadManager::new(Arc::clone(&eal), logger.clone()));
    let mut control_plane = ControlPlane::new(Arc::clone(&thread_manager), logger.clone());
    control_plane.initialize(ControlPlaneConfig {
        socket_path: args.socket_path,
        ..Default::default()
    })?;

    thread_manager
        .launch_all(&config.pmd_threads)
        .context("Worker launch error")?;

    control_plane.run()?;

    // Workers are already joined; a port stop failure here must not fail the
    // shutdown.
    if let Err(e) = ports.stop_all() {
        log_warning!(
            logger,
            Facility::Port,
            &format!("port stop during shutdown: {}", e)
        );
    }

    log_consumer.stop();
    Ok(())
}
