//! Protocol session: request correlation and event routing
//!
//! A [`Session`] owns every piece of per-connection state: the id counter,
//! the pending-call table, the event listener table and the optional script
//! side-table. Handles are cheap clones over the same state.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::common::{Error, Result};
use crate::transport::Transport;

use super::scripts::{script_id, ScriptMap, ScriptRecord};
use super::types::{ChannelId, Event, Inbound, Message, Request, Response, DEFAULT_CHANNEL};

/// Event announcing a newly compiled script
pub const SCRIPT_PARSED: &str = "Debugger.scriptParsed";

/// Source URL of the probe script used to drain the engine's pending tasks.
/// Its `scriptParsed` event is internal and never reaches listeners.
pub const WAIT_PENDING_TASKS_URL: &str = "wait-pending-tasks.js";

/// Persistent event handler
pub type EventHandler = Box<dyn FnMut(&Event) + Send + 'static>;

/// Receives `frontend: ...` / `backend: ...` protocol dump lines
pub type ProtocolSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

enum Listener {
    Persistent(EventHandler),
    Once(oneshot::Sender<Result<Event>>),
}

#[derive(Default)]
struct Tables {
    last_id: i64,
    pending: HashMap<i64, oneshot::Sender<Response>>,
    listeners: HashMap<String, Listener>,
    /// Bumped on every registration change, per event name
    revisions: HashMap<String, u64>,
    scripts: Option<ScriptMap>,
    protocol_sink: Option<ProtocolSink>,
}

impl Tables {
    fn touch(&mut self, event: &str) -> u64 {
        let revision = self.revisions.entry(event.to_string()).or_insert(0);
        *revision += 1;
        *revision
    }

    fn revision(&self, event: &str) -> u64 {
        self.revisions.get(event).copied().unwrap_or(0)
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    tables: Mutex<Tables>,
}

/// Handle to one protocol session
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a session sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                tables: Mutex::new(Tables::default()),
            }),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a command on the default channel
    pub fn send(&self, method: &str, params: Value) -> PendingResponse {
        self.send_to(method, params, DEFAULT_CHANNEL)
    }

    /// Send a command on a specific channel
    ///
    /// The message is written immediately; the returned future only waits
    /// for the reply. There is no timeout.
    pub fn send_to(&self, method: &str, params: Value, channel: ChannelId) -> PendingResponse {
        let (id, rx) = {
            let mut tables = self.tables();
            let mut id = tables.last_id + 1;
            // Skip ids taken by raw commands still in flight
            while tables.pending.contains_key(&id) {
                id += 1;
            }
            tables.last_id = id;
            let (tx, rx) = oneshot::channel();
            tables.pending.insert(id, tx);
            (id, rx)
        };

        let request = Request {
            id,
            method: method.to_string(),
            params,
        };
        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                self.tables().pending.remove(&id);
                return PendingResponse::failed(method, e.into());
            }
        };

        match self.write(&text, channel) {
            Ok(()) => PendingResponse::waiting(method, rx),
            Err(e) => {
                self.tables().pending.remove(&id);
                PendingResponse::failed(method, e)
            }
        }
    }

    /// Send pre-serialized text under a caller-chosen id
    pub fn send_raw_command(&self, id: i64, text: &str, channel: ChannelId) -> PendingResponse {
        let label = format!("raw command {}", id);
        let rx = {
            let mut tables = self.tables();
            if tables.pending.contains_key(&id) {
                return PendingResponse::failed(&label, Error::DuplicateRequestId(id));
            }
            let (tx, rx) = oneshot::channel();
            tables.pending.insert(id, tx);
            rx
        };

        match self.write(text, channel) {
            Ok(()) => PendingResponse::waiting(&label, rx),
            Err(e) => {
                self.tables().pending.remove(&id);
                PendingResponse::failed(&label, e)
            }
        }
    }

    fn write(&self, text: &str, channel: ChannelId) -> Result<()> {
        let sink = self.tables().protocol_sink.clone();
        if let Some(sink) = sink {
            sink(&format!("frontend: {}", text));
        }
        tracing::debug!(channel, "frontend: {}", text);
        self.inner.transport.send_message(text, channel)
    }

    /// Register a persistent handler, replacing any previous one
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let mut tables = self.tables();
        tables.touch(event);
        tables
            .listeners
            .insert(event.to_string(), Listener::Persistent(Box::new(handler)));
    }

    /// Remove the handler for `event`, if any
    pub fn off(&self, event: &str) {
        let mut tables = self.tables();
        tables.touch(event);
        tables.listeners.remove(event);
    }

    /// Wait for the next occurrence of `event`
    ///
    /// The listener is installed now and removes itself when it fires.
    pub fn once(&self, event: &str) -> EventWaiter {
        let (tx, rx) = oneshot::channel();
        let mut tables = self.tables();
        tables.touch(event);
        tables
            .listeners
            .insert(event.to_string(), Listener::Once(tx));
        EventWaiter {
            event: event.to_string(),
            rx,
        }
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.tables().listeners.contains_key(event)
    }

    pub fn pending_count(&self) -> usize {
        self.tables().pending.len()
    }

    /// Route serialized or decoded inbound traffic
    pub fn dispatch_inbound(&self, inbound: Inbound) -> Result<()> {
        let raw = match inbound {
            Inbound::Json(value) => value,
            Inbound::Text(text) => {
                let sink = self.tables().protocol_sink.clone();
                if let Some(sink) = sink {
                    sink(&format!("backend: {}", text));
                }
                let value = Inbound::Text(text).into_value()?;
                return self.route(value);
            }
        };
        self.dispatch(raw)
    }

    /// Route one decoded inbound message
    pub fn dispatch(&self, raw: Value) -> Result<()> {
        let sink = self.tables().protocol_sink.clone();
        if let Some(sink) = sink {
            sink(&format!("backend: {}", raw));
        }
        self.route(raw)
    }

    fn route(&self, raw: Value) -> Result<()> {
        tracing::debug!("backend: {}", raw);

        match Message::classify(raw)? {
            Message::Response(response) => {
                let tx = response
                    .id()
                    .and_then(|id| self.tables().pending.remove(&id));
                match tx {
                    Some(tx) => {
                        // The waiter may have been dropped; nothing to do then
                        let _ = tx.send(response);
                    }
                    None => tracing::trace!(
                        "No pending call for id {}",
                        response.as_value()["id"]
                    ),
                }
                Ok(())
            }
            Message::Event(event) => self.route_event(event),
        }
    }

    fn route_event(&self, event: Event) -> Result<()> {
        if event.method() == SCRIPT_PARSED {
            let mut tables = self.tables();
            if let Some(scripts) = tables.scripts.as_mut() {
                scripts.record(event.params())?;
            }
            drop(tables);

            let url = event.params().get("url").and_then(|u| u.as_str());
            if url == Some(WAIT_PENDING_TASKS_URL) {
                return Ok(());
            }
        }

        let (listener, revision) = {
            let mut tables = self.tables();
            let listener = tables.listeners.remove(event.method());
            (listener, tables.revision(event.method()))
        };

        match listener {
            None => {
                tracing::trace!("No listener for {}", event.method());
                Ok(())
            }
            Some(Listener::Once(tx)) => {
                let _ = tx.send(Ok(event));
                Ok(())
            }
            Some(Listener::Persistent(mut handler)) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)));

                let mut tables = self.tables();
                // Put the handler back unless it re-registered or removed itself
                if tables.revision(event.method()) == revision {
                    tables
                        .listeners
                        .insert(event.method().to_string(), Listener::Persistent(handler));
                }
                drop(tables);

                outcome.map_err(|payload| Error::HandlerPanicked {
                    event: event.method().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            }
        }
    }

    /// Start recording `Debugger.scriptParsed` events. Idempotent.
    pub fn enable_script_map(&self) {
        let mut tables = self.tables();
        if tables.scripts.is_none() {
            tables.scripts = Some(ScriptMap::new());
        }
    }

    pub fn script_map_enabled(&self) -> bool {
        self.tables().scripts.is_some()
    }

    /// Snapshot of a recorded script
    pub fn script(&self, id: &Value) -> Option<ScriptRecord> {
        let key = script_id(Some(id))?;
        self.tables()
            .scripts
            .as_ref()
            .and_then(|scripts| scripts.get(&key).cloned())
    }

    /// Cache a script's source text
    pub fn set_script_source(&self, id: &Value, source: String) -> bool {
        let Some(key) = script_id(Some(id)) else {
            return false;
        };
        self.tables()
            .scripts
            .as_mut()
            .map(|scripts| scripts.set_source(&key, source))
            .unwrap_or(false)
    }

    /// Install or clear the protocol dump sink
    pub fn set_protocol_sink(&self, sink: Option<ProtocolSink>) {
        self.tables().protocol_sink = sink;
    }

    /// Drop every pending call and listener
    ///
    /// Outstanding futures resolve with [`Error::SessionClosed`].
    pub fn shutdown(&self) {
        let mut tables = self.tables();
        let pending = tables.pending.len();
        tables.pending.clear();
        for (event, listener) in tables.listeners.drain() {
            if let Listener::Once(tx) = listener {
                let _ = tx.send(Err(Error::SessionClosed(event)));
            }
        }
        tracing::info!(pending, "Session shut down");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

enum PendingState {
    Waiting(oneshot::Receiver<Response>),
    Failed(Option<Error>),
}

/// Future for a command's response
///
/// Resolves with the response even when it carries an `error` member; `Err`
/// is reserved for transport failures and session shutdown.
pub struct PendingResponse {
    method: String,
    state: PendingState,
}

impl PendingResponse {
    fn waiting(method: &str, rx: oneshot::Receiver<Response>) -> Self {
        Self {
            method: method.to_string(),
            state: PendingState::Waiting(rx),
        }
    }

    fn failed(method: &str, error: Error) -> Self {
        Self {
            method: method.to_string(),
            state: PendingState::Failed(Some(error)),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for PendingResponse {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.map_err(|_| Error::SessionClosed(this.method.clone()))),
            PendingState::Failed(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| Error::SessionClosed(this.method.clone())))),
        }
    }
}

/// Future for the next occurrence of an event
pub struct EventWaiter {
    event: String,
    rx: oneshot::Receiver<Result<Event>>,
}

impl EventWaiter {
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Future for EventWaiter {
    type Output = Result<Event>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|r| match r {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ListenerReplaced(this.event.clone())),
        })
    }
}
