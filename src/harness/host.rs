//! Environment utilities consumed by the harness
//!
//! The [`Host`] trait is the narrow interface to whatever embeds the engine:
//! printing transcript lines, quitting, reading files and the session hooks
//! (compiling scripts, context groups, scheduled pauses).

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::common::{Error, Result};
use crate::protocol::ChannelId;

/// Where a compiled script claims to come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptOrigin {
    pub url: String,
    pub line_offset: i32,
    pub column_offset: i32,
    pub is_module: bool,
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Append one line to the transcript
    fn print(&self, line: &str);

    /// Terminate the session
    fn quit(&self);

    fn read_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    async fn compile_and_run_with_origin(&self, source: &str, origin: &ScriptOrigin) -> Result<()>;

    async fn create_context_group(&self) -> Result<ChannelId> {
        Err(Error::Unsupported("createContextGroup"))
    }

    async fn schedule_pause_on_next_statement(
        &self,
        _channel: ChannelId,
        _reason: &str,
        _details: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("schedulePauseOnNextStatement"))
    }

    async fn cancel_pause_on_next_statement(&self, _channel: ChannelId) -> Result<()> {
        Err(Error::Unsupported("cancelPauseOnNextStatement"))
    }

    async fn reconnect(&self) -> Result<()> {
        Err(Error::Unsupported("reconnect"))
    }

    async fn set_current_time_ms_for_test(&self, _ms: f64) -> Result<()> {
        Err(Error::Unsupported("setCurrentTimeMSForTest"))
    }
}

/// Recorded output lines, optionally echoed to stdout
#[derive(Clone)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
    echo: bool,
}

impl Transcript {
    pub fn new(echo: bool) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            echo,
        }
    }

    pub fn push(&self, line: &str) {
        if self.echo {
            println!("{}", line);
        }
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The transcript as file contents, one trailing newline
    pub fn text(&self) -> String {
        let mut text = self.lines().join("\n");
        text.push('\n');
        text
    }
}

/// Latched "session finished" flag
#[derive(Clone)]
pub struct QuitSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for QuitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl QuitSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once [`trigger`](Self::trigger) has been called
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|quit| *quit).await;
    }
}

/// In-process host that records everything it is asked to do
pub struct BufferHost {
    transcript: Transcript,
    quit: QuitSignal,
    compiled: Mutex<Vec<(String, ScriptOrigin)>>,
    next_group: Mutex<ChannelId>,
}

impl Default for BufferHost {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferHost {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::new(false),
            quit: QuitSignal::new(),
            compiled: Mutex::new(Vec::new()),
            next_group: Mutex::new(1),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn lines(&self) -> Vec<String> {
        self.transcript.lines()
    }

    pub fn quit_signal(&self) -> QuitSignal {
        self.quit.clone()
    }

    pub fn has_quit(&self) -> bool {
        self.quit.is_set()
    }

    /// Scripts handed to `compile_and_run_with_origin`, in order
    pub fn compiled(&self) -> Vec<(String, ScriptOrigin)> {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Host for BufferHost {
    fn print(&self, line: &str) {
        self.transcript.push(line);
    }

    fn quit(&self) {
        self.quit.trigger();
    }

    async fn compile_and_run_with_origin(&self, source: &str, origin: &ScriptOrigin) -> Result<()> {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((source.to_string(), origin.clone()));
        Ok(())
    }

    async fn create_context_group(&self) -> Result<ChannelId> {
        let mut next = self.next_group.lock().unwrap_or_else(PoisonError::into_inner);
        let group = *next;
        *next += 1;
        Ok(group)
    }

    async fn schedule_pause_on_next_statement(
        &self,
        _channel: ChannelId,
        _reason: &str,
        _details: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn cancel_pause_on_next_statement(&self, _channel: ChannelId) -> Result<()> {
        Ok(())
    }
}
