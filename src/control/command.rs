// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command decoding and dispatch.
//!
//! One newline-terminated frame holds a JSON object
//! `{"command": <name>, "params": <object>}`; the response is a single-line
//! JSON object `{"status": "success", "result": ...}` or
//! `{"status": "error", "error": ...}`. Parse failures produce an error
//! response and keep the connection open.

use std::sync::Arc;

use serde_json::{json, Value};

use super::ShutdownFn;
use crate::config::parser::byte_offset;
use crate::error::{Error, Result};
use crate::worker::PmdThreadManager;

pub struct CommandHandler {
    thread_manager: Arc<PmdThreadManager>,
    shutdown: ShutdownFn,
}

struct CommandRequest {
    command: String,
    #[allow(dead_code)]
    params: Value,
}

impl CommandHandler {
    pub fn new(thread_manager: Arc<PmdThreadManager>, shutdown: ShutdownFn) -> Self {
        Self {
            thread_manager,
            shutdown,
        }
    }

    /// Handle one frame and format the response line.
    pub fn handle_command(&self, frame: &str) -> String {
        match parse_command(frame) {
            Ok(request) => self.execute(&request),
            Err(e) => error_response(&e.message()),
        }
    }

    fn execute(&self, request: &CommandRequest) -> String {
        match request.command.as_str() {
            "shutdown" => self.handle_shutdown(),
            "status" => self.handle_status(),
            "get_threads" => self.handle_get_threads(),
            other => error_response(&format!("Unknown command: {}", other)),
        }
    }

    fn handle_shutdown(&self) -> String {
        let response = success_response(json!({"message": "Shutdown initiated"}));
        (self.shutdown)();
        response
    }

    fn handle_status(&self) -> String {
        success_response(json!({
            "main_lcore": self.thread_manager.eal().main_lcore(),
            "num_pmd_threads": self.thread_manager.thread_count(),
            "uptime_seconds": 0,
        }))
    }

    fn handle_get_threads(&self) -> String {
        let threads: Vec<Value> = self
            .thread_manager
            .lcore_ids()
            .into_iter()
            .map(|lcore_id| json!({"lcore_id": lcore_id}))
            .collect();
        success_response(json!({ "threads": threads }))
    }
}

fn parse_command(frame: &str) -> Result<CommandRequest> {
    if frame.is_empty() {
        return Err(Error::invalid_argument("Command content is empty"));
    }

    let root: Value = serde_json::from_str(frame).map_err(|e| {
        let offset = byte_offset(frame, e.line(), e.column());
        Error::invalid_argument(format!("JSON parse error at byte {}: {}", offset, e))
    })?;

    let obj = root
        .as_object()
        .ok_or_else(|| Error::invalid_argument("Command must be a JSON object"))?;

    let command = obj
        .get("command")
        .ok_or_else(|| Error::invalid_argument("Missing required field: command"))?
        .as_str()
        .ok_or_else(|| Error::invalid_argument("Field 'command' must be a string"))?
        .to_string();

    let params = obj
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    Ok(CommandRequest { command, params })
}

fn success_response(result: Value) -> String {
    json!({"status": "success", "result": result}).to_string()
}

fn error_response(message: &str) -> String {
    json!({"status": "error", "error": message}).to_string()
}
