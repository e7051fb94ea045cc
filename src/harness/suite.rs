//! Sequential test suites
//!
//! Tests run one after another, each introduced by a `Running test:` banner.
//! When the last test finishes the session is completed.

use std::future::Future;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use super::Harness;
use crate::common::Result;

/// Advance handle given to a callback-style test
///
/// Dropping it without calling [`Next::advance`] abandons the suite.
pub struct Next {
    tx: Option<oneshot::Sender<()>>,
}

impl Next {
    pub fn advance(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

type CallbackBody = Box<dyn FnOnce(Harness, Next) + Send>;
type AsyncBody = Box<dyn FnOnce(Harness) -> BoxFuture<'static, Result<()>> + Send>;

/// A test that signals completion through [`Next`]
pub struct CallbackTest {
    name: String,
    run: CallbackBody,
}

impl CallbackTest {
    pub fn new<F>(name: &str, run: F) -> Self
    where
        F: FnOnce(Harness, Next) + Send + 'static,
    {
        Self {
            name: name.to_string(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A test that completes when its future does
pub struct AsyncTest {
    name: String,
    run: AsyncBody,
}

impl AsyncTest {
    pub fn new<F, Fut>(name: &str, run: F) -> Self
    where
        F: FnOnce(Harness) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            run: Box::new(move |harness| Box::pin(run(harness))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Harness {
    fn log_banner(&self, name: &str) {
        tracing::info!(test = name, "Running test");
        self.log(&format!("\nRunning test: {}", name));
    }

    /// Run callback tests in order, then complete the session
    pub async fn run_test_suite(&self, tests: Vec<CallbackTest>) -> Result<()> {
        for test in tests {
            if self.is_complete() {
                return Ok(());
            }
            self.log_banner(&test.name);

            let (tx, rx) = oneshot::channel();
            (test.run)(self.clone(), Next { tx: Some(tx) });
            if rx.await.is_err() {
                tracing::warn!(test = %test.name, "Test dropped its advance handle");
                self.log(&format!("Test '{}' ended without advancing", test.name));
                break;
            }
        }
        self.complete_test().await
    }

    /// Run async tests in order, then complete the session
    ///
    /// A test returning an error is reported in the transcript and ends
    /// the suite.
    pub async fn run_async_test_suite(&self, tests: Vec<AsyncTest>) -> Result<()> {
        for test in tests {
            if self.is_complete() {
                return Ok(());
            }
            self.log_banner(&test.name);

            if let Err(e) = (test.run)(self.clone()).await {
                tracing::error!(test = %test.name, "Test failed: {}", e);
                self.log(&format!("Test '{}' failed: {}", test.name, e));
                break;
            }
        }
        self.complete_test().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::common::Error;
    use crate::harness::BufferHost;
    use crate::protocol::{ChannelId, Session};
    use crate::transport::ChannelTransport;

    fn setup() -> (Harness, Arc<BufferHost>, mpsc::UnboundedReceiver<(ChannelId, String)>) {
        let (transport, outbound) = ChannelTransport::new();
        let host = Arc::new(BufferHost::new());
        let harness = Harness::new(Session::new(Arc::new(transport)), host.clone());
        (harness, host, outbound)
    }

    /// Reply `{}` to every command the harness sends
    fn auto_reply(harness: &Harness, mut outbound: mpsc::UnboundedReceiver<(ChannelId, String)>) {
        let session = harness.session().clone();
        tokio::spawn(async move {
            while let Some((_, text)) = outbound.recv().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                session
                    .dispatch(json!({"id": request["id"], "result": {}}))
                    .unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_async_suite_runs_in_order() {
        let (harness, host, outbound) = setup();
        auto_reply(&harness, outbound);

        let tests = vec![
            AsyncTest::new("first", |h: Harness| async move {
                let response = h.domain("Runtime").call("enable").await?;
                h.expect_success("enable", &response).await;
                Ok::<_, Error>(())
            }),
            AsyncTest::new("second", |h: Harness| async move {
                h.log("in second");
                Ok::<_, Error>(())
            }),
        ];
        harness.run_async_test_suite(tests).await.unwrap();

        assert_eq!(
            host.lines(),
            vec![
                "\nRunning test: first",
                "PASS: enable",
                "\nRunning test: second",
                "in second",
            ]
        );
        assert!(host.has_quit());
        assert_eq!(host.transcript().text(), "\nRunning test: first\nPASS: enable\n\nRunning test: second\nin second\n");
    }

    #[tokio::test]
    async fn test_async_suite_stops_on_error() {
        let (harness, host, outbound) = setup();
        auto_reply(&harness, outbound);

        let tests = vec![
            AsyncTest::new("broken", |_h: Harness| async move {
                Err::<(), _>(Error::TestAssertion("nope".into()))
            }),
            AsyncTest::new("never", |h: Harness| async move {
                h.log("unreachable");
                Ok::<_, Error>(())
            }),
        ];
        harness.run_async_test_suite(tests).await.unwrap();

        assert_eq!(
            host.lines(),
            vec![
                "\nRunning test: broken",
                "Test 'broken' failed: Test assertion failed: nope",
            ]
        );
        assert!(host.has_quit());
    }

    #[tokio::test]
    async fn test_callback_suite_advances() {
        let (harness, host, outbound) = setup();
        auto_reply(&harness, outbound);

        let tests = vec![
            CallbackTest::new("a", |h, next| {
                tokio::spawn(async move {
                    h.log("a ran");
                    next.advance();
                });
            }),
            CallbackTest::new("b", |h, next| {
                h.log("b ran");
                next.advance();
            }),
        ];
        harness.run_test_suite(tests).await.unwrap();

        assert_eq!(
            host.lines(),
            vec!["\nRunning test: a", "a ran", "\nRunning test: b", "b ran"]
        );
        assert!(host.has_quit());
    }

    #[tokio::test]
    async fn test_callback_suite_abandoned() {
        let (harness, host, outbound) = setup();
        auto_reply(&harness, outbound);

        let tests = vec![
            CallbackTest::new("drops", |_h, next| drop(next)),
            CallbackTest::new("skipped", |h, next| {
                h.log("unreachable");
                next.advance();
            }),
        ];
        harness.run_test_suite(tests).await.unwrap();

        assert_eq!(
            host.lines(),
            vec!["\nRunning test: drops", "Test 'drops' ended without advancing"]
        );
        assert!(host.has_quit());
    }

    #[tokio::test]
    async fn test_empty_suite_completes() {
        let (harness, host, outbound) = setup();
        auto_reply(&harness, outbound);
        harness.run_async_test_suite(Vec::new()).await.unwrap();
        assert!(host.lines().is_empty());
        assert!(host.has_quit());
    }
}
