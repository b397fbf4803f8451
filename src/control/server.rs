// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Unix command socket server.
//!
//! Binds a local stream socket (unlinking any stale file first, then setting
//! mode 0660), accepts concurrently, and runs each connection through a
//! read-frame → dispatch → write-frame loop until the peer closes. Frames are
//! `\n`-delimited; a trailing `\r` is stripped. A watch channel fans the stop
//! signal out to the acceptor and every connection task, all of which live on
//! the reactor thread.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::command::CommandHandler;
use crate::error::{Error, Result};
use crate::logging::{Facility, Logger};
use crate::{log_debug, log_notice};

const SOCKET_MODE: u32 = 0o660;

pub struct UnixSocketServer {
    socket_path: PathBuf,
    logger: Logger,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
}

impl UnixSocketServer {
    pub fn new(socket_path: PathBuf, logger: Logger) -> Self {
        Self {
            socket_path,
            logger,
            shutdown_tx: None,
            accept_task: None,
        }
    }

    /// Bind the socket and start accepting. Must run inside the reactor.
    pub fn start(&mut self, handler: Arc<CommandHandler>) -> Result<()> {
        if self.accept_task.is_some() {
            return Err(Error::failed_precondition("Server is already running"));
        }

        // A previous run may have left a stale socket file behind.
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::internal(format!(
                    "Failed to remove stale socket {}: {}",
                    self.socket_path.display(),
                    e
                )))
            }
        }

        let listener = {
            let std_listener =
                std::os::unix::net::UnixListener::bind(&self.socket_path).map_err(|e| {
                    Error::internal(format!(
                        "Failed to bind Unix socket {}: {}",
                        self.socket_path.display(),
                        e
                    ))
                })?;
            std_listener
                .set_nonblocking(true)
                .map_err(|e| Error::internal(format!("Failed to set socket non-blocking: {}", e)))?;
            UnixListener::from_std(std_listener)
                .map_err(|e| Error::internal(format!("Failed to register socket: {}", e)))?
        };

        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(SOCKET_MODE);
            std::fs::set_permissions(&self.socket_path, perms).map_err(|e| {
                Error::internal(format!(
                    "Failed to set socket permissions on {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let logger = self.logger.clone();

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            handler,
            shutdown_rx,
            logger,
        )));
        self.shutdown_tx = Some(shutdown_tx);

        log_notice!(
            self.logger,
            Facility::ControlSocket,
            &format!(
                "Unix socket server listening on {}",
                self.socket_path.display()
            )
        );
        Ok(())
    }

    /// Close the acceptor and every active connection.
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(accept_task) = self.accept_task.take() {
            let _ = accept_task.await;
        }
    }
}

impl Drop for UnixSocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<CommandHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
    logger: Logger,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        Arc::clone(&handler),
                        shutdown_rx.clone(),
                        logger.clone(),
                    ));
                }
                Err(e) => {
                    logger.error(
                        Facility::ControlSocket,
                        &format!("Failed to accept connection: {}", e),
                    );
                }
            },
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    handler: Arc<CommandHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
    logger: Logger,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            line = lines.next_line() => {
                let mut frame = match line {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break, // peer closed
                    Err(e) => {
                        log_debug!(
                            logger,
                            Facility::ControlSocket,
                            &format!("Error reading from socket: {}", e)
                        );
                        break;
                    }
                };

                if frame.ends_with('\r') {
                    frame.pop();
                }

                let response = handler.handle_command(&frame);
                if write_half.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DpdkConfig;
    use crate::eal::Eal;
    use crate::logging::LogRegistry;
    use crate::worker::PmdThreadManager;
    use tokio::io::AsyncReadExt;

    fn command_handler() -> Arc<CommandHandler> {
        let logger = LogRegistry::with_capacity(64).logger();
        let config = DpdkConfig {
            core_mask: Some("0x1".to_string()),
            ..Default::default()
        };
        let eal = Eal::init(&config, logger.clone()).unwrap();
        let thread_manager = Arc::new(PmdThreadManager::new(eal, logger));
        Arc::new(CommandHandler::new(thread_manager, Arc::new(|| {})))
    }

    async fn roundtrip(stream: &mut UnixStream, frame: &str) -> serde_json::Value {
        stream.write_all(frame.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_requests_and_survives_bad_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let logger = LogRegistry::with_capacity(64).logger();

        let mut server = UnixSocketServer::new(path.clone(), logger);
        server.start(command_handler()).unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();

        let response = roundtrip(&mut stream, r#"{"command": "status"}"#).await;
        assert_eq!(response["status"], "success");

        // A garbage frame produces an error response but keeps the
        // connection usable.
        let response = roundtrip(&mut stream, "garbage").await;
        assert_eq!(response["status"], "error");

        let response = roundtrip(&mut stream, "{\"command\": \"get_threads\"}\r").await;
        assert_eq!(response["status"], "success");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_socket_mode_and_stale_file_handling() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        std::fs::write(&path, b"stale").unwrap();

        let logger = LogRegistry::with_capacity(64).logger();
        let mut server = UnixSocketServer::new(path.clone(), logger);
        server.start(command_handler()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        server.stop().await;
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let logger = LogRegistry::with_capacity(64).logger();

        let mut server = UnixSocketServer::new(path, logger);
        server.start(command_handler()).unwrap();
        let err = server.start(command_handler()).unwrap_err();
        assert!(err.message().contains("already running"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_active_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let logger = LogRegistry::with_capacity(64).logger();

        let mut server = UnixSocketServer::new(path.clone(), logger);
        server.start(command_handler()).unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        server.stop().await;

        // The connection task exits on the shutdown signal; the client sees
        // EOF rather than a hung read.
        let mut buf = Vec::new();
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            stream.read_to_end(&mut buf),
        )
        .await;
        assert!(read.is_ok());
    }
}
