//! Engine subprocess transport
//!
//! The engine is spawned with piped stdio. Both directions carry
//! `Content-Length` framed JSON envelopes ([`Frame`]):
//!
//! - `protocol` frames wrap one serialized inspector message plus its channel
//! - `control` / `controlResult` frames carry host hooks (compiling scripts,
//!   context groups, scheduled pauses) which are not inspector traffic

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use crate::common::{Error, Result};
use crate::harness::host::{Host, QuitSignal, ScriptOrigin, Transcript};
use crate::protocol::{ChannelId, Inbound};

use super::{codec, Transport};

/// How long the engine gets to exit after `quit` before it is killed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Envelope exchanged with the engine process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// One inspector protocol message
    Protocol { channel: ChannelId, message: String },
    /// Host hook invoked on the engine
    Control {
        id: u64,
        command: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Reply to a control frame
    ControlResult {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

type ControlReply = std::result::Result<Value, String>;

#[derive(Default)]
struct ControlTable {
    pending: HashMap<u64, oneshot::Sender<ControlReply>>,
    closed: bool,
}

/// Transport over an engine subprocess
pub struct ProcessTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    control: Arc<Mutex<ControlTable>>,
    next_control_id: AtomicU64,
    child: tokio::sync::Mutex<Child>,
}

impl ProcessTransport {
    /// Spawn the engine and start the reader and writer tasks
    ///
    /// Returns the transport and the stream of inbound protocol messages.
    /// The stream ends when the engine closes its stdout.
    pub async fn spawn(
        engine_path: &Path,
        args: &[String],
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Inbound>)> {
        let mut cmd = Command::new(engine_path);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::EngineStartFailed(format!(
                "Failed to start {}: {}",
                engine_path.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::EngineStartFailed("Failed to get engine stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EngineStartFailed("Failed to get engine stdout".to_string()))?;

        tracing::info!(
            engine = %engine_path.display(),
            pid = child.id(),
            "Engine started"
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let control = Arc::new(Mutex::new(ControlTable::default()));

        tokio::spawn(write_loop(BufWriter::new(stdin), outbound_rx));
        tokio::spawn(read_loop(BufReader::new(stdout), inbound_tx, control.clone()));

        let transport = Arc::new(Self {
            outbound: outbound_tx,
            control,
            next_control_id: AtomicU64::new(1),
            child: tokio::sync::Mutex::new(child),
        });

        Ok((transport, inbound_rx))
    }

    /// Invoke a host hook on the engine and wait for its reply
    pub async fn control(&self, command: &str, arguments: Value) -> Result<Value> {
        let id = self.next_control_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            if table.closed {
                return Err(Error::EngineCrashed);
            }
            table.pending.insert(id, tx);
        }

        tracing::debug!(id, command, "control >>> {}", arguments);
        self.outbound
            .send(Frame::Control {
                id,
                command: command.to_string(),
                arguments,
            })
            .map_err(|_| Error::TransportClosed("engine writer stopped".to_string()))?;

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(Error::control_failed(command, &message)),
            Err(_) => Err(Error::EngineCrashed),
        }
    }

    /// Ask the engine to exit, killing it if it does not
    pub async fn terminate(&self) -> Result<()> {
        let id = self.next_control_id.fetch_add(1, Ordering::SeqCst);
        let _ = self.outbound.send(Frame::Control {
            id,
            command: "quit".to_string(),
            arguments: Value::Null,
        });

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "Engine exited");
            }
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {
                tracing::warn!("Engine did not exit after quit; killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

impl Transport for ProcessTransport {
    fn send_message(&self, message: &str, channel: ChannelId) -> Result<()> {
        self.outbound
            .send(Frame::Protocol {
                channel,
                message: message.to_string(),
            })
            .map_err(|_| Error::TransportClosed("engine writer stopped".to_string()))
    }
}

async fn write_loop(mut writer: BufWriter<ChildStdin>, mut frames: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to encode frame: {}", e);
                continue;
            }
        };
        if let Err(e) = codec::write_message(&mut writer, &json).await {
            tracing::warn!("Engine stdin closed: {}", e);
            break;
        }
    }
}

async fn read_loop(
    mut reader: BufReader<ChildStdout>,
    inbound: mpsc::UnboundedSender<Inbound>,
    control: Arc<Mutex<ControlTable>>,
) {
    loop {
        let body = match codec::read_message(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::info!("Engine closed its output");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read from engine: {}", e);
                break;
            }
        };

        let frame: Frame = match serde_json::from_str(&body) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring undecodable frame ({}): {}", e, body);
                continue;
            }
        };

        match frame {
            Frame::Protocol { message, .. } => {
                if inbound.send(Inbound::Text(message)).is_err() {
                    tracing::debug!("Inbound receiver dropped; stopping reader");
                    break;
                }
            }
            Frame::ControlResult { id, result, error } => {
                tracing::debug!(id, "control <<< {:?} {:?}", result, error);
                let tx = control
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pending
                    .remove(&id);
                match tx {
                    Some(tx) => {
                        let reply = match error {
                            Some(message) => Err(message),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(reply);
                    }
                    None => tracing::trace!("No pending control call for id {}", id),
                }
            }
            Frame::Control { command, .. } => {
                tracing::warn!("Engine sent unexpected control command '{}'", command);
            }
        }
    }

    // Fail outstanding control calls; their senders drop here
    let mut table = control.lock().unwrap_or_else(PoisonError::into_inner);
    table.closed = true;
    table.pending.clear();
}

/// [`Host`] backed by an engine subprocess
pub struct EngineHost {
    transport: Arc<ProcessTransport>,
    transcript: Transcript,
    quit: QuitSignal,
}

impl EngineHost {
    pub fn new(transport: Arc<ProcessTransport>, transcript: Transcript, quit: QuitSignal) -> Self {
        Self {
            transport,
            transcript,
            quit,
        }
    }
}

#[async_trait]
impl Host for EngineHost {
    fn print(&self, line: &str) {
        self.transcript.push(line);
    }

    fn quit(&self) {
        self.quit.trigger();
    }

    async fn compile_and_run_with_origin(&self, source: &str, origin: &ScriptOrigin) -> Result<()> {
        self.transport
            .control(
                "compileAndRunWithOrigin",
                json!({
                    "source": source,
                    "url": origin.url,
                    "lineOffset": origin.line_offset,
                    "columnOffset": origin.column_offset,
                    "isModule": origin.is_module,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_context_group(&self) -> Result<ChannelId> {
        let result = self.transport.control("createContextGroup", json!({})).await?;
        result
            .get("contextGroupId")
            .and_then(|id| id.as_i64())
            .and_then(|id| ChannelId::try_from(id).ok())
            .ok_or_else(|| {
                Error::control_failed("createContextGroup", "reply has no contextGroupId")
            })
    }

    async fn schedule_pause_on_next_statement(
        &self,
        channel: ChannelId,
        reason: &str,
        details: &str,
    ) -> Result<()> {
        self.transport
            .control(
                "schedulePauseOnNextStatement",
                json!({
                    "contextGroupId": channel,
                    "breakReason": reason,
                    "breakDetails": details,
                }),
            )
            .await?;
        Ok(())
    }

    async fn cancel_pause_on_next_statement(&self, channel: ChannelId) -> Result<()> {
        self.transport
            .control("cancelPauseOnNextStatement", json!({ "contextGroupId": channel }))
            .await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        self.transport.control("reconnect", json!({})).await?;
        Ok(())
    }

    async fn set_current_time_ms_for_test(&self, ms: f64) -> Result<()> {
        self.transport
            .control("setCurrentTimeMSForTest", json!({ "time": ms }))
            .await?;
        Ok(())
    }
}
