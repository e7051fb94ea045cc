//! Test harness over a protocol session
//!
//! [`Harness`] combines a [`Session`] with a [`Host`] and provides what test
//! code needs: logging normalized messages, PASS/FAIL expectations, script
//! injection, source-location rendering and orderly session completion.

pub mod host;
mod suite;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::protocol::scripts::annotate_location;
use crate::protocol::{ChannelId, Domain, Inbound, PendingResponse, Response, Session};
use crate::trace;

pub use host::{BufferHost, Host, QuitSignal, ScriptOrigin, Transcript};
pub use suite::{AsyncTest, CallbackTest, Next};

/// Expression whose evaluation drains the engine's pending tasks
pub const WAIT_PENDING_TASKS_EXPRESSION: &str =
    "new Promise(r => setTimeout(r, 0))//# sourceURL=wait-pending-tasks.js";

struct Inner {
    session: Session,
    host: Arc<dyn Host>,
    teardown_method: String,
    completed: AtomicBool,
}

/// Handle to a running test session
#[derive(Clone)]
pub struct Harness {
    inner: Arc<Inner>,
}

impl Harness {
    pub fn new(session: Session, host: Arc<dyn Host>) -> Self {
        Self::with_teardown(session, host, "Debugger.disable")
    }

    /// Use `teardown_method` as the command sent when the session completes
    pub fn with_teardown(session: Session, host: Arc<dyn Host>, teardown_method: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                host,
                teardown_method: teardown_method.to_string(),
                completed: AtomicBool::new(false),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    /// Shorthand for `session().domain(name)`
    pub fn domain(&self, name: &str) -> Domain {
        self.inner.session.domain(name)
    }

    // === Logging ===

    pub fn log(&self, text: &str) {
        self.inner.host.print(text);
    }

    /// Log the normalized rendering of a message and hand it back
    pub fn log_message<'a>(&self, message: &'a Value) -> &'a Value {
        self.log(&trace::render_message(message));
        message
    }

    pub fn log_object(&self, value: &Value, title: Option<&str>) {
        self.log(&trace::dump(value, title));
    }

    /// Print `frontend:`/`backend:` lines for all subsequent traffic
    pub fn start_dumping_protocol_messages(&self) {
        let host = self.inner.host.clone();
        self.inner
            .session
            .set_protocol_sink(Some(Arc::new(move |line: &str| host.print(line))));
    }

    // === Expectations ===

    /// PASS if the response has no `error`; otherwise FAIL and complete
    pub async fn expect_success(&self, name: &str, response: &Response) -> bool {
        self.check_expectation(false, name, response).await
    }

    /// PASS if the response has an `error`; otherwise FAIL and complete
    pub async fn expect_error(&self, name: &str, response: &Response) -> bool {
        self.check_expectation(true, name, response).await
    }

    async fn check_expectation(&self, expect_error: bool, name: &str, response: &Response) -> bool {
        if expect_error == response.is_error() {
            self.log(&format!("PASS: {}", name));
            return true;
        }

        self.log(&format!("FAIL: {}: {}", name, response.as_value()));
        if let Err(e) = self.complete_test().await {
            tracing::warn!("Completing after a failed expectation: {}", e);
        }
        false
    }

    // === Completion ===

    /// Send the teardown command, await it, then quit the host
    ///
    /// Only the first call does anything.
    pub async fn complete_test(&self) -> Result<()> {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(teardown = %self.inner.teardown_method, "Completing test session");

        let response = self
            .inner
            .session
            .send(&self.inner.teardown_method, json!({}))
            .await;
        self.inner.host.quit();

        match response {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Teardown command failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Evaluate a probe that resolves after the engine's queued tasks
    pub fn wait_pending_tasks(&self) -> PendingResponse {
        self.domain("Runtime").send(
            "evaluate",
            json!({
                "expression": WAIT_PENDING_TASKS_EXPRESSION,
                "awaitPromise": true,
            }),
        )
    }

    pub async fn complete_test_after_pending_timeouts(&self) -> Result<()> {
        self.wait_pending_tasks().await?;
        self.complete_test().await
    }

    // === Scripts ===

    pub async fn add_script(
        &self,
        source: &str,
        line_offset: i32,
        column_offset: i32,
    ) -> Result<()> {
        let origin = ScriptOrigin {
            url: String::new(),
            line_offset,
            column_offset,
            is_module: false,
        };
        self.inner.host.compile_and_run_with_origin(source, &origin).await
    }

    pub async fn add_script_with_url(&self, source: &str, url: &str) -> Result<()> {
        let origin = ScriptOrigin {
            url: url.to_string(),
            ..ScriptOrigin::default()
        };
        self.inner.host.compile_and_run_with_origin(source, &origin).await
    }

    pub async fn add_module(
        &self,
        source: &str,
        url: &str,
        line_offset: i32,
        column_offset: i32,
    ) -> Result<()> {
        let origin = ScriptOrigin {
            url: url.to_string(),
            line_offset,
            column_offset,
            is_module: true,
        };
        self.inner.host.compile_and_run_with_origin(source, &origin).await
    }

    /// Read a file through the host and run it as a script
    pub async fn load_script(&self, path: &Path) -> Result<()> {
        let source = self.inner.host.read_file(path)?;
        self.add_script(&source, 0, 0).await
    }

    /// Send pre-serialized command text under a caller-chosen id
    pub fn send_raw_command(&self, id: i64, text: &str, channel: ChannelId) -> PendingResponse {
        self.inner.session.send_raw_command(id, text, channel)
    }

    // === Source locations ===

    /// Start recording parsed scripts; call before `Debugger.enable`
    pub fn setup_script_map(&self) {
        self.inner.session.enable_script_map();
    }

    /// Log `functionName (url:line:column)` for each frame
    pub fn log_call_frames(&self, frames: &[Value]) {
        for frame in frames {
            let function_name = frame
                .get("functionName")
                .and_then(|n| n.as_str())
                .filter(|n| !n.is_empty())
                .unwrap_or("(anonymous)");

            let url = match frame.get("url").and_then(|u| u.as_str()).filter(|u| !u.is_empty()) {
                Some(url) => url.to_string(),
                None => frame
                    .pointer("/location/scriptId")
                    .and_then(|id| self.inner.session.script(id))
                    .and_then(|script| script.url().map(str::to_string))
                    .unwrap_or_default(),
            };

            let position = frame.get("location").unwrap_or(frame);
            self.log(&format!(
                "{} ({}:{}:{})",
                function_name,
                url,
                number_text(position.get("lineNumber")),
                number_text(position.get("columnNumber"))
            ));
        }
    }

    /// Log the source around a location, with `#` at the column
    ///
    /// The script's source is fetched with `Debugger.getScriptSource` the
    /// first time and cached in the script map.
    pub async fn log_source_location(&self, location: &Value) -> Result<()> {
        let script_id = location.get("scriptId").cloned().unwrap_or(Value::Null);
        let Some(script) = self.inner.session.script(&script_id) else {
            self.log("setup_script_map should be called before Debugger.enable.");
            self.complete_test().await?;
            return Err(Error::TestAssertion(format!(
                "script {} is not in the script map",
                script_id
            )));
        };

        let source = match script.source {
            Some(source) => source,
            None => {
                let response = self
                    .domain("Debugger")
                    .send("getScriptSource", json!({ "scriptId": script_id }))
                    .await?;
                let source = response
                    .result_at("/scriptSource")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| {
                        Error::TestAssertion(format!(
                            "Debugger.getScriptSource returned no source: {}",
                            response.as_value()
                        ))
                    })?
                    .to_string();
                self.inner.session.set_script_source(&script_id, source.clone());
                source
            }
        };

        let line = position(location.get("lineNumber"));
        let column = position(location.get("columnNumber"));
        self.log(&annotate_location(&source, line, column)?);
        self.log("");
        Ok(())
    }

    /// Log several locations, one after another
    pub async fn log_source_locations(&self, locations: &[Value]) -> Result<()> {
        for location in locations {
            self.log_source_location(location).await?;
        }
        Ok(())
    }

    /// Log an async stack trace chain, following `parent` links
    pub fn log_async_stack_trace(&self, stack_trace: &Value) {
        let mut current = Some(stack_trace).filter(|t| t.is_object());
        while let Some(trace) = current {
            let description = trace
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("");

            match trace.get("promiseCreationFrame").filter(|f| f.is_object()) {
                Some(frame) => self.log(&format!(
                    "-- {} ({}:{}:{})--",
                    description,
                    frame.get("url").and_then(|u| u.as_str()).unwrap_or(""),
                    number_text(frame.get("lineNumber")),
                    number_text(frame.get("columnNumber"))
                )),
                None => self.log(&format!("-- {} --", description)),
            }

            if let Some(frames) = trace.get("callFrames").and_then(|f| f.as_array()) {
                self.log_call_frames(frames);
            }
            current = trace.get("parent").filter(|p| p.is_object());
        }
    }

    // === Session hooks ===

    pub async fn create_context_group(&self) -> Result<ChannelId> {
        self.inner.host.create_context_group().await
    }

    pub async fn schedule_pause_on_next_statement(
        &self,
        channel: ChannelId,
        reason: &str,
        details: &str,
    ) -> Result<()> {
        self.inner
            .host
            .schedule_pause_on_next_statement(channel, reason, details)
            .await
    }

    pub async fn cancel_pause_on_next_statement(&self, channel: ChannelId) -> Result<()> {
        self.inner.host.cancel_pause_on_next_statement(channel).await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.inner.host.reconnect().await
    }

    pub async fn set_current_time_ms_for_test(&self, ms: f64) -> Result<()> {
        self.inner.host.set_current_time_ms_for_test(ms).await
    }

    // === Inbound traffic ===

    /// Route one inbound message
    ///
    /// A failure while routing is fatal: it is logged with the offending
    /// message and the session is completed in the background.
    pub fn handle_inbound(&self, inbound: Inbound) {
        let original = inbound.clone();
        if let Err(e) = self.inner.session.dispatch_inbound(inbound) {
            let shown = match &original {
                Inbound::Json(value) => serde_json::to_string_pretty(value).unwrap_or_default(),
                Inbound::Text(text) => serde_json::from_str::<Value>(text)
                    .ok()
                    .and_then(|v| serde_json::to_string_pretty(&v).ok())
                    .unwrap_or_else(|| text.clone()),
            };
            tracing::error!(
                backtrace = %std::backtrace::Backtrace::force_capture(),
                "Dispatch failed: {}",
                e
            );
            self.log(&format!(
                "Exception when dispatching message: {}\n message = {}",
                e, shown
            ));
            let harness = self.clone();
            tokio::spawn(async move {
                if let Err(e) = harness.complete_test().await {
                    tracing::warn!("Completing after dispatch failure: {}", e);
                }
            });
        }
    }

    /// Drain inbound messages on a background task, in arrival order
    ///
    /// If the stream ends before the session completed, outstanding calls
    /// are failed and the host is told to quit.
    pub fn spawn_dispatch_loop(
        &self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> JoinHandle<()> {
        let harness = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                harness.handle_inbound(message);
            }

            if !harness.is_complete() {
                tracing::warn!("Engine closed the connection before the test completed");
                harness.inner.completed.store(true, Ordering::SeqCst);
                harness.inner.session.shutdown();
                harness.inner.host.quit();
            }
        })
    }
}

fn number_text(value: Option<&Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}

fn position(value: Option<&Value>) -> usize {
    value
        .and_then(|v| v.as_u64())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    struct Fixture {
        harness: Harness,
        host: Arc<BufferHost>,
        outbound: mpsc::UnboundedReceiver<(ChannelId, String)>,
    }

    fn fixture() -> Fixture {
        let (transport, outbound) = ChannelTransport::new();
        let session = Session::new(Arc::new(transport));
        let host = Arc::new(BufferHost::new());
        let harness = Harness::new(session, host.clone());
        Fixture {
            harness,
            host,
            outbound,
        }
    }

    fn last_sent(outbound: &mut mpsc::UnboundedReceiver<(ChannelId, String)>) -> Value {
        let (_, text) = outbound.try_recv().expect("nothing sent");
        serde_json::from_str(&text).unwrap()
    }

    /// Answer every teardown command as the engine would
    fn answer_teardown(
        harness: &Harness,
        outbound: &mut mpsc::UnboundedReceiver<(ChannelId, String)>,
    ) {
        let request = last_sent(outbound);
        assert_eq!(request["method"], "Debugger.disable");
        harness
            .session()
            .dispatch(json!({"id": request["id"], "result": {}}))
            .unwrap();
    }

    #[tokio::test]
    async fn test_expect_success_passes() {
        let mut f = fixture();
        let pending = f.harness.domain("Debugger").call("enable");
        let request = last_sent(&mut f.outbound);
        assert_eq!(request, json!({"id": 1, "method": "Debugger.enable", "params": {}}));

        f.harness.session().dispatch(json!({"id": 1, "result": {}})).unwrap();
        let response = pending.await.unwrap();
        assert!(f.harness.expect_success("enable", &response).await);
        assert_eq!(f.host.lines(), vec!["PASS: enable"]);
        assert!(!f.host.has_quit());
    }

    #[tokio::test]
    async fn test_expect_error_passes_on_error() {
        let f = fixture();
        let pending = f.harness.domain("Debugger").call("setBreakpointByUrl");
        f.harness
            .session()
            .dispatch(json!({"id": 1, "error": {"message": "x"}}))
            .unwrap();
        let response = pending.await.unwrap();
        assert!(f.harness.expect_error("bad args", &response).await);
        assert_eq!(f.host.lines(), vec!["PASS: bad args"]);
    }

    #[tokio::test]
    async fn test_expect_success_fails_and_completes() {
        let mut f = fixture();
        let pending = f.harness.domain("Debugger").call("setBreakpointByUrl");
        last_sent(&mut f.outbound);
        f.harness
            .session()
            .dispatch(json!({"id": 1, "error": {"message": "x"}}))
            .unwrap();
        let response = pending.await.unwrap();

        let harness = f.harness.clone();
        let check =
            tokio::spawn(async move { harness.expect_success("should work", &response).await });

        // Teardown goes out; answer it so completion can finish
        let (_, text) = f.outbound.recv().await.unwrap();
        let teardown: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(teardown["method"], "Debugger.disable");
        f.harness
            .session()
            .dispatch(json!({"id": teardown["id"], "result": {}}))
            .unwrap();

        assert!(!check.await.unwrap());
        assert_eq!(
            f.host.lines(),
            vec![r#"FAIL: should work: {"id":1,"error":{"message":"x"}}"#]
        );
        assert!(f.host.has_quit());
    }

    #[tokio::test]
    async fn test_complete_test_runs_once() {
        let mut f = fixture();
        let harness = f.harness.clone();
        let done = tokio::spawn(async move { harness.complete_test().await });
        let (_, text) = f.outbound.recv().await.unwrap();
        let teardown: Value = serde_json::from_str(&text).unwrap();
        f.harness
            .session()
            .dispatch(json!({"id": teardown["id"], "result": {}}))
            .unwrap();
        done.await.unwrap().unwrap();
        assert!(f.host.has_quit());

        f.harness.complete_test().await.unwrap();
        assert!(f.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_custom_teardown_method() {
        let (transport, mut outbound) = ChannelTransport::new();
        let host = Arc::new(BufferHost::new());
        let session = Session::new(Arc::new(transport));
        let harness = Harness::with_teardown(session, host.clone(), "Runtime.disable");
        let h = harness.clone();
        let done = tokio::spawn(async move { h.complete_test().await });
        let (_, text) = outbound.recv().await.unwrap();
        assert!(text.contains("Runtime.disable"));
        harness.session().dispatch(json!({"id": 1, "result": {}})).unwrap();
        done.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_log_message_normalizes() {
        let f = fixture();
        let message = json!({"id": 4, "result": {"scriptId": "12", "b": 1, "a": "x"}});
        let returned = f.harness.log_message(&message);
        assert_eq!(returned, &message);
        assert_eq!(
            f.host.lines(),
            vec!["{\n    id : <messageId>\n    result : {\n        a : x\n        b : 1\n        scriptId : <scriptId>\n    }\n}"]
        );
    }

    #[tokio::test]
    async fn test_protocol_dump_goes_to_transcript() {
        let f = fixture();
        f.harness.start_dumping_protocol_messages();
        let _pending = f.harness.domain("Runtime").call("enable");
        f.harness.handle_inbound(Inbound::Text(r#"{"id":1,"result":{}}"#.to_string()));
        assert_eq!(
            f.host.lines(),
            vec![
                r#"frontend: {"id":1,"method":"Runtime.enable","params":{}}"#,
                r#"backend: {"id":1,"result":{}}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_add_scripts_forward_origin() {
        let f = fixture();
        f.harness.add_script("a()", 2, 3).await.unwrap();
        f.harness.add_script_with_url("b()", "b.js").await.unwrap();
        f.harness.add_module("export {}", "m.mjs", 1, 0).await.unwrap();

        let compiled = f.host.compiled();
        assert_eq!(compiled.len(), 3);
        let origin = ScriptOrigin {
            url: String::new(),
            line_offset: 2,
            column_offset: 3,
            is_module: false,
        };
        assert_eq!(compiled[0].1, origin);
        assert_eq!(compiled[1].1.url, "b.js");
        assert!(compiled[2].1.is_module);
    }

    #[tokio::test]
    async fn test_load_script_reads_file() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.js");
        std::fs::write(&path, "var x = 1;").unwrap();

        f.harness.load_script(&path).await.unwrap();
        assert_eq!(f.host.compiled()[0].0, "var x = 1;");

        let missing = f.harness.load_script(&dir.path().join("missing.js")).await;
        assert!(matches!(missing, Err(Error::FileRead { .. })));
    }

    #[tokio::test]
    async fn test_wait_pending_tasks_expression() {
        let mut f = fixture();
        let _pending = f.harness.wait_pending_tasks();
        let request = last_sent(&mut f.outbound);
        assert_eq!(request["method"], "Runtime.evaluate");
        assert_eq!(request["params"]["awaitPromise"], true);
        assert!(request["params"]["expression"]
            .as_str()
            .unwrap()
            .ends_with("sourceURL=wait-pending-tasks.js"));
    }

    #[tokio::test]
    async fn test_log_call_frames_uses_script_map() {
        let f = fixture();
        f.harness.setup_script_map();
        f.harness
            .session()
            .dispatch(json!({"method": "Debugger.scriptParsed", "params": {"scriptId": "5", "url": "test.js"}}))
            .unwrap();

        f.harness.log_call_frames(&[
            json!({"functionName": "foo", "location": {"scriptId": "5", "lineNumber": 3, "columnNumber": 4}}),
            json!({"functionName": "", "url": "other.js", "lineNumber": 1, "columnNumber": 0}),
        ]);
        assert_eq!(
            f.host.lines(),
            vec!["foo (test.js:3:4)", "(anonymous) (other.js:1:0)"]
        );
    }

    #[tokio::test]
    async fn test_log_source_location_fetches_once() {
        let mut f = fixture();
        f.harness.setup_script_map();
        f.harness
            .session()
            .dispatch(json!({"method": "Debugger.scriptParsed", "params": {"scriptId": "5", "url": "test.js"}}))
            .unwrap();

        let location = json!({"scriptId": "5", "lineNumber": 1, "columnNumber": 2});
        let harness = f.harness.clone();
        let loc = location.clone();
        let first = tokio::spawn(async move { harness.log_source_location(&loc).await });

        let (_, text) = f.outbound.recv().await.unwrap();
        let request: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(request["method"], "Debugger.getScriptSource");
        assert_eq!(request["params"]["scriptId"], "5");
        f.harness
            .session()
            .dispatch(json!({"id": request["id"], "result": {"scriptSource": "function f() {\n  debugger;\n}\nf();"}}))
            .unwrap();
        first.await.unwrap().unwrap();

        // Cached: no second fetch
        f.harness.log_source_location(&location).await.unwrap();
        assert!(f.outbound.try_recv().is_err());

        let expected = "function f() {\n  #debugger;\n}";
        assert_eq!(f.host.lines(), vec![expected, "", expected, ""]);
    }

    #[tokio::test]
    async fn test_log_source_location_without_script_map() {
        let mut f = fixture();
        let harness = f.harness.clone();
        let task = tokio::spawn(async move {
            harness
                .log_source_location(&json!({"scriptId": "1", "lineNumber": 0}))
                .await
        });
        let (channel, text) = f.outbound.recv().await.unwrap();
        let (tx, mut sent) = mpsc::unbounded_channel();
        tx.send((channel, text)).unwrap();
        answer_teardown(&f.harness, &mut sent);
        assert!(task.await.unwrap().is_err());
        assert_eq!(
            f.host.lines()[0],
            "setup_script_map should be called before Debugger.enable."
        );
        assert!(f.host.has_quit());
    }

    #[tokio::test]
    async fn test_log_async_stack_trace() {
        let f = fixture();
        f.harness.log_async_stack_trace(&json!({
            "description": "setTimeout",
            "callFrames": [{"functionName": "inner", "url": "a.js", "lineNumber": 1, "columnNumber": 2}],
            "parent": {
                "description": "Promise.then",
                "promiseCreationFrame": {"url": "b.js", "lineNumber": 5, "columnNumber": 6},
                "callFrames": []
            }
        }));
        assert_eq!(
            f.host.lines(),
            vec![
                "-- setTimeout --",
                "inner (a.js:1:2)",
                "-- Promise.then (b.js:5:6)--",
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_logs_and_completes() {
        let mut f = fixture();
        f.harness.session().on("Debugger.paused", |_| panic!("handler broke"));
        f.harness.handle_inbound(Inbound::Json(json!({"method": "Debugger.paused", "params": {}})));

        let (_, text) = f.outbound.recv().await.unwrap();
        let teardown: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(teardown["method"], "Debugger.disable");
        f.harness
            .session()
            .dispatch(json!({"id": teardown["id"], "result": {}}))
            .unwrap();
        f.host.quit_signal().wait().await;

        let first = &f.host.lines()[0];
        assert!(first.starts_with(
            "Exception when dispatching message: Handler for 'Debugger.paused' panicked: handler broke"
        ));
        assert!(first.contains("\"method\": \"Debugger.paused\""));
    }

    #[tokio::test]
    async fn test_inbound_shown_only_on_failure() {
        let f = fixture();
        f.harness.handle_inbound(Inbound::Text(r#"{"id":42,"result":{}}"#.to_string()));
        assert!(f.host.lines().is_empty());

        f.harness.handle_inbound(Inbound::Text("{broken".to_string()));
        let first = &f.host.lines()[0];
        assert!(first.starts_with("Exception when dispatching message: "));
        assert!(first.ends_with("\n message = {broken"));
    }

    #[tokio::test]
    async fn test_dispatch_loop_shuts_down_when_engine_goes_away() {
        let f = fixture();
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = f.harness.domain("Runtime").call("evaluate");
        let task = f.harness.spawn_dispatch_loop(rx);
        drop(tx);
        task.await.unwrap();

        assert!(f.host.has_quit());
        assert!(matches!(pending.await, Err(Error::SessionClosed(_))));
    }
}
