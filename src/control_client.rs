// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `dpdkctl`: command-line client for the daemon's control socket.
//!
//! Sends one newline-framed JSON command and prints the single-line JSON
//! response.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: CliCommand,

    /// Path to the control socket
    #[arg(
        long = "socket_path",
        alias = "socket-path",
        default_value = "/tmp/dpdk_control.sock"
    )]
    socket_path: PathBuf,
}

#[derive(Parser, Debug, PartialEq)]
enum CliCommand {
    /// Report daemon status
    Status,
    /// List running PMD threads
    GetThreads,
    /// Initiate graceful shutdown
    Shutdown,
}

fn command_name(command: &CliCommand) -> &'static str {
    match command {
        CliCommand::Status => "status",
        CliCommand::GetThreads => "get_threads",
        CliCommand::Shutdown => "shutdown",
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut stream = UnixStream::connect(&args.socket_path).with_context(|| {
        format!(
            "failed to connect to control socket {}",
            args.socket_path.display()
        )
    })?;

    let request = json!({"command": command_name(&args.command)}).to_string();
    stream.write_all(request.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut response = String::new();
    BufReader::new(&stream)
        .read_line(&mut response)
        .context("failed to read response")?;
    print!("{}", response);

    let parsed: serde_json::Value =
        serde_json::from_str(response.trim_end()).context("malformed response")?;
    if parsed["status"] == "error" {
        std::process::exit(1);
    }

    Ok(())
}
