//! Domain-scoped command façade
//!
//! `session.domain("Debugger")` gives call sites that read like the protocol
//! itself (`debugger.call("enable")`, `debugger.on("paused", ..)`) without
//! declaring every method up front. Member names can also be resolved at run
//! time by naming convention:
//!
//! | member         | meaning                                   |
//! |----------------|-------------------------------------------|
//! | `onPaused`     | persistent handler for `Debugger.paused`  |
//! | `oncePaused`   | wait for the next `Debugger.paused`       |
//! | anything else  | command `Debugger.<member>`               |

use serde_json::{json, Value};

use super::session::{EventWaiter, PendingResponse, Session};
use super::types::{ChannelId, Event, DEFAULT_CHANNEL};

/// What a member name resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// Command with this method name
    Command(String),
    /// Persistent subscription to this event name
    Subscribe(String),
    /// One-shot wait for this event name
    Once(String),
}

impl Member {
    /// Resolve a member name by the `on`/`once` prefix convention
    ///
    /// The event part must start with an uppercase letter followed by at
    /// least one alphanumeric; its first letter is lowercased.
    pub fn parse(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix("on") {
            if let Some(event) = rest.strip_prefix("ce").and_then(event_name) {
                return Member::Once(event);
            }
            if let Some(event) = event_name(rest) {
                return Member::Subscribe(event);
            }
        }
        Member::Command(name.to_string())
    }
}

fn event_name(rest: &str) -> Option<String> {
    let mut chars = rest.chars();
    let first = chars.next().filter(|c| c.is_ascii_uppercase())?;
    let tail: String = chars.take_while(|c| c.is_ascii_alphanumeric()).collect();
    if tail.is_empty() {
        return None;
    }
    let mut event = first.to_ascii_lowercase().to_string();
    event.push_str(&tail);
    Some(event)
}

/// Commands and events of one protocol domain
#[derive(Clone)]
pub struct Domain {
    session: Session,
    name: String,
}

impl Domain {
    pub(crate) fn new(session: Session, name: &str) -> Self {
        Self {
            session,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn qualify(&self, member: &str) -> String {
        format!("{}.{}", self.name, member)
    }

    /// Send `Domain.method` with empty params
    pub fn call(&self, method: &str) -> PendingResponse {
        self.send(method, json!({}))
    }

    /// Send `Domain.method` on the default channel
    pub fn send(&self, method: &str, params: Value) -> PendingResponse {
        self.send_to(method, params, DEFAULT_CHANNEL)
    }

    pub fn send_to(&self, method: &str, params: Value, channel: ChannelId) -> PendingResponse {
        self.session.send_to(&self.qualify(method), params, channel)
    }

    /// Handle every `Domain.event`, replacing any previous handler
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.session.on(&self.qualify(event), handler);
    }

    pub fn off(&self, event: &str) {
        self.session.off(&self.qualify(event));
    }

    /// Wait for the next `Domain.event`
    pub fn once(&self, event: &str) -> EventWaiter {
        self.session.once(&self.qualify(event))
    }

    /// Resolve a member name by naming convention
    pub fn member(&self, name: &str) -> Bound {
        match Member::parse(name) {
            Member::Command(method) => Bound::Command(CommandFn {
                domain: self.clone(),
                method,
            }),
            Member::Subscribe(event) => Bound::Subscribe(SubscribeFn {
                domain: self.clone(),
                event,
            }),
            Member::Once(event) => Bound::Once(OnceFn {
                domain: self.clone(),
                event,
            }),
        }
    }
}

/// A member bound to its domain, ready to be invoked
pub enum Bound {
    Command(CommandFn),
    Subscribe(SubscribeFn),
    Once(OnceFn),
}

impl Bound {
    /// Fully qualified method or event name
    pub fn qualified_name(&self) -> String {
        match self {
            Bound::Command(f) => f.domain.qualify(&f.method),
            Bound::Subscribe(f) => f.domain.qualify(&f.event),
            Bound::Once(f) => f.domain.qualify(&f.event),
        }
    }
}

pub struct CommandFn {
    domain: Domain,
    method: String,
}

impl CommandFn {
    /// Send the command; missing params become `{}`
    pub fn invoke(&self, params: Option<Value>, channel: Option<ChannelId>) -> PendingResponse {
        self.domain.send_to(
            &self.method,
            params.unwrap_or_else(|| json!({})),
            channel.unwrap_or(DEFAULT_CHANNEL),
        )
    }
}

pub struct SubscribeFn {
    domain: Domain,
    event: String,
}

impl SubscribeFn {
    pub fn register<F>(&self, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.domain.on(&self.event, handler);
    }
}

pub struct OnceFn {
    domain: Domain,
    event: String,
}

impl OnceFn {
    pub fn wait(&self) -> EventWaiter {
        self.domain.once(&self.event)
    }
}

impl Session {
    /// Façade for one protocol domain
    pub fn domain(&self, name: &str) -> Domain {
        Domain::new(self.clone(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_member_parse() {
        assert_eq!(Member::parse("enable"), Member::Command("enable".into()));
        assert_eq!(Member::parse("onPaused"), Member::Subscribe("paused".into()));
        assert_eq!(Member::parse("oncePaused"), Member::Once("paused".into()));
        assert_eq!(
            Member::parse("onScriptParsed"),
            Member::Subscribe("scriptParsed".into())
        );
        assert_eq!(
            Member::parse("onceExecutionContextCreated"),
            Member::Once("executionContextCreated".into())
        );
    }

    #[test]
    fn test_member_parse_edge_cases() {
        // Single uppercase letter is not an event
        assert_eq!(Member::parse("onA"), Member::Command("onA".into()));
        // Lowercase after the prefix is a command
        assert_eq!(Member::parse("oncefoo"), Member::Command("oncefoo".into()));
        assert_eq!(Member::parse("on"), Member::Command("on".into()));
        // "onCe..." subscribes to an event starting with "ce"
        assert_eq!(
            Member::parse("onCertificateError"),
            Member::Subscribe("certificateError".into())
        );
        // Prefix match only: trailing punctuation is dropped
        assert_eq!(Member::parse("onPaused_x"), Member::Subscribe("paused".into()));
    }

    #[tokio::test]
    async fn test_domain_routes_through_session() {
        let (transport, mut outbound) = ChannelTransport::new();
        let session = Session::new(Arc::new(transport));
        let debugger = session.domain("Debugger");

        let Bound::Command(enable) = debugger.member("enable") else {
            panic!("expected command");
        };
        let pending = enable.invoke(None, Some(2));
        let (channel, text) = outbound.try_recv().unwrap();
        assert_eq!(channel, 2);
        assert_eq!(text, r#"{"id":1,"method":"Debugger.enable","params":{}}"#);

        session.dispatch(json!({"id": 1, "result": {}})).unwrap();
        assert!(!pending.await.unwrap().is_error());
    }

    #[tokio::test]
    async fn test_on_paused_invoked_once_per_event() {
        let (transport, _outbound) = ChannelTransport::new();
        let session = Session::new(Arc::new(transport));
        let calls = Arc::new(AtomicUsize::new(0));

        let Bound::Subscribe(on_paused) = session.domain("Debugger").member("onPaused") else {
            panic!("expected subscription");
        };
        let counter = calls.clone();
        on_paused.register(move |event| {
            assert_eq!(event.params()["callFrames"], json!([]));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session
            .dispatch(json!({"method": "Debugger.paused", "params": {"callFrames": []}}))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_once_member() {
        let (transport, _outbound) = ChannelTransport::new();
        let session = Session::new(Arc::new(transport));
        let bound = session.domain("Runtime").member("onceConsoleAPICalled");
        assert_eq!(bound.qualified_name(), "Runtime.consoleAPICalled");

        let Bound::Once(once) = bound else {
            panic!("expected once");
        };
        let waiter = once.wait();
        session
            .dispatch(json!({"method": "Runtime.consoleAPICalled", "params": {"type": "log"}}))
            .unwrap();
        assert_eq!(waiter.await.unwrap().params()["type"], "log");
    }
}
