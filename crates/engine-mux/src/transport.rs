//! Line channels to the engine.
//!
//! A transport only moves text. Outbound lines go through
//! [`Transport::send_line`]; inbound traffic arrives as [`TransportEvent`]s
//! on the [`EventStream`] handed out when the transport is created.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::TransportError;

/// Something the engine side of a transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A chunk of output; usually one line, possibly several joined by `\n`.
    Line(String),
    /// The channel broke.
    Failed(String),
    /// The engine closed its output.
    Closed,
}

/// Inbound half of a transport.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Outbound half of a duplex line channel to an engine.
pub trait Transport: Send + Sync {
    /// Write one command line. Must not block.
    fn send_line(&self, line: &str) -> Result<(), TransportError>;

    /// Release the channel. Further sends fail.
    fn close(&self);
}

/// An engine running as a child process, spoken to over stdin/stdout.
pub struct ProcessTransport {
    commands: mpsc::UnboundedSender<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessTransport {
    /// Spawn the engine and start its writer and reader tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the process cannot be
    /// spawned or its pipes cannot be taken.
    pub fn spawn<P: AsRef<Path>>(
        program: P,
        args: &[String],
    ) -> Result<(Self, EventStream), TransportError> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::Unavailable(format!("{}: {}", program.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Unavailable("Failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Unavailable("Failed to open stdout".to_string()))?;

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Task to write to stdin
        let writer_events = event_tx.clone();
        let mut stdin_writer = stdin;
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                let written = async {
                    stdin_writer.write_all(cmd.as_bytes()).await?;
                    stdin_writer.write_all(b"\n").await?;
                    stdin_writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!(error = %e, "engine stdin closed");
                    let _ = writer_events.send(TransportEvent::Failed(e.to_string()));
                    break;
                }
            }
        });

        // Task to read from stdout
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if event_tx.send(TransportEvent::Line(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = event_tx.send(TransportEvent::Closed);
                        break;
                    }
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Failed(e.to_string()));
                        break;
                    }
                }
            }
        });

        debug!(program = %program.display(), "engine process spawned");
        Ok((
            Self {
                commands: command_tx,
                child: Mutex::new(Some(child)),
            },
            event_rx,
        ))
    }
}

impl Transport for ProcessTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        self.commands
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the engine to quit, then kill it if it is still around.
    fn close(&self) {
        let _ = self.commands.send("quit".to_string());
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    // Give it a moment to exit
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let _ = child.kill().await;
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

/// An in-memory transport whose other end is an [`EngineEnd`].
///
/// Used to host an in-process engine, and to script engine output in tests.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Create a connected transport, its event stream, and the engine side.
    pub fn pair() -> (Self, EventStream, EngineEnd) {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                closed: AtomicBool::new(false),
            },
            event_rx,
            EngineEnd { commands, events },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// The engine's side of a [`ChannelTransport`].
pub struct EngineEnd {
    commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl EngineEnd {
    /// Emit output. A chunk may hold several lines joined by `\n`.
    pub fn reply(&self, chunk: &str) {
        let _ = self.events.send(TransportEvent::Line(chunk.to_string()));
    }

    /// Report a broken channel.
    pub fn fail(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Failed(message.to_string()));
    }

    /// Close the engine's output.
    pub fn hang_up(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Wait for the next command written to the engine.
    pub async fn next_command(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// All commands written so far, without waiting.
    pub fn drain_commands(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.commands.try_recv() {
            out.push(cmd);
        }
        out
    }
}
