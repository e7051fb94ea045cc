//! Test runner implementation
//!
//! Executes a scenario against an engine subprocess: every scenario test
//! becomes one async test of a harness suite, and the resulting transcript
//! is compared against the scenario's expectations file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use serde_json::Value;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::harness::{AsyncTest, Harness, QuitSignal, Transcript};
use crate::protocol::{Bound, ChannelId, EventWaiter, Session};
use crate::transport::{EngineHost, ProcessTransport};

use super::config::{Expectation, LogMode, Scenario, ScenarioTest, Step};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Flags from the command line that shape a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Engine executable, overriding the configured one
    pub engine: Option<PathBuf>,
    pub dump_protocol: bool,
    /// Rewrite the expectations file instead of comparing against it
    pub update: bool,
    pub verbose: bool,
}

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub tests_total: usize,
    pub transcript: String,
    pub error: Option<String>,
}

/// Load a scenario from a YAML file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        Error::Scenario(format!("Failed to parse '{}': {}", path.display(), e))
    })
}

/// `<dir>/<stem><suffix>` for a scenario file
pub fn expectations_path(scenario_path: &Path, suffix: &str) -> PathBuf {
    let stem = scenario_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    scenario_path.with_file_name(format!("{}{}", stem, suffix))
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(
    path: &Path,
    config: &Config,
    options: &RunOptions,
) -> Result<TestResult> {
    let scenario = load_scenario(path)?;
    let tests_total = scenario.tests.len();

    println!(
        "\n{} {}",
        "Running Scenario:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let engine = config.resolve_engine(options.engine.as_deref())?;
    if options.verbose {
        println!("  Engine: {}", engine.display().to_string().dimmed());
    }

    let (transport, inbound) = ProcessTransport::spawn(&engine, &config.engine.args).await?;
    println!("  {} Engine started", "✓".green());

    let transcript = Transcript::new(config.harness.echo);
    let quit = QuitSignal::new();
    let host = Arc::new(EngineHost::new(transport.clone(), transcript.clone(), quit.clone()));
    let session = Session::new(transport.clone());
    let harness = Harness::with_teardown(session, host, &config.harness.teardown_method);

    if scenario.setup_script_map {
        harness.setup_script_map();
    }
    if scenario.dump_protocol || options.dump_protocol || config.harness.dump_protocol {
        harness.start_dumping_protocol_messages();
    }
    let pump = harness.spawn_dispatch_loop(inbound);

    let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let scenario_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let tests = scenario
        .tests
        .into_iter()
        .map(|ScenarioTest { name, steps }| {
            let failure = failure.clone();
            let dir = scenario_dir.clone();
            let label = name.clone();
            AsyncTest::new(&name, move |harness: Harness| async move {
                let result = run_steps(&harness, &steps, &dir).await;
                if let Err(e) = &result {
                    let mut failure = failure.lock().unwrap_or_else(PoisonError::into_inner);
                    if failure.is_none() {
                        *failure = Some(format!("{}: {}", label, e));
                    }
                }
                result
            })
        })
        .collect();

    let limit = Duration::from_secs(scenario.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let outcome = tokio::time::timeout(limit, async {
        tokio::select! {
            result = harness.run_async_test_suite(tests) => result,
            _ = quit.wait() => Ok(()),
        }
    })
    .await;

    if let Err(e) = transport.terminate().await {
        tracing::warn!("Failed to stop engine: {}", e);
    }
    pump.abort();

    let text = transcript.text();
    let test_failure = failure.lock().unwrap_or_else(PoisonError::into_inner).take();
    let mut error = match outcome {
        Ok(Ok(())) => test_failure.or_else(|| transcript_failure(&text)),
        Ok(Err(e)) => test_failure.or(Some(e.to_string())),
        Err(_) => Some(format!("Scenario timed out after {}s", limit.as_secs())),
    };

    let expected_path = expectations_path(path, &config.scenarios.expectations_suffix);
    if options.update {
        std::fs::write(&expected_path, &text)?;
        println!(
            "  {} Wrote {}",
            "✓".green(),
            expected_path.display().to_string().dimmed()
        );
    } else if expected_path.exists() {
        let expected = std::fs::read_to_string(&expected_path)?;
        if let Some((line, want, got)) = first_difference(&expected, &text) {
            println!(
                "  {} Transcript differs from {} at line {}",
                "✗".red(),
                expected_path.display(),
                line
            );
            println!("    {} {}", "-".red(), want.red());
            println!("    {} {}", "+".green(), got.green());
            if error.is_none() {
                error = Some(format!(
                    "Transcript differs from {} at line {}",
                    expected_path.display(),
                    line
                ));
            }
        }
    }

    let passed = error.is_none();
    if passed {
        println!("\n{} {}\n", "✓".green().bold(), "Scenario Passed".green().bold());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), "Scenario Failed".red().bold());
    }

    Ok(TestResult {
        name: scenario.name,
        passed,
        tests_total,
        transcript: text,
        error,
    })
}

/// Run one test's steps, stopping early once the session completed
///
/// A one-shot event step that follows a detached command is armed before
/// the command goes out, so the event cannot slip past it.
async fn run_steps(harness: &Harness, steps: &[Step], scenario_dir: &Path) -> Result<()> {
    let mut armed = None;
    for (index, step) in steps.iter().enumerate() {
        if harness.is_complete() {
            break;
        }
        let waiter = armed.take();
        let next = if is_detached_command(harness, step) {
            steps.get(index + 1).and_then(|next| arm_waiter(harness, next))
        } else {
            None
        };
        execute_step(harness, step, scenario_dir, waiter).await?;
        armed = next;
    }
    Ok(())
}

fn is_detached_command(harness: &Harness, step: &Step) -> bool {
    match step {
        Step::Call {
            member,
            detach: true,
            ..
        } => matches!(bind(harness, member), Ok(Bound::Command(_))),
        _ => false,
    }
}

fn arm_waiter(harness: &Harness, step: &Step) -> Option<EventWaiter> {
    match step {
        Step::Call { member, .. } => match bind(harness, member) {
            Ok(Bound::Once(once)) => Some(once.wait()),
            _ => None,
        },
        _ => None,
    }
}

fn bind(harness: &Harness, member: &str) -> Result<Bound> {
    let (domain, member) = member.split_once('.').ok_or_else(|| {
        Error::Scenario(format!("member '{}' is not of the form Domain.member", member))
    })?;
    Ok(harness.domain(domain).member(member))
}

/// Execute a single test step
async fn execute_step(
    harness: &Harness,
    step: &Step,
    scenario_dir: &Path,
    armed: Option<EventWaiter>,
) -> Result<()> {
    match step {
        Step::Call {
            member,
            params,
            channel,
            name,
            expect,
            log,
            detach,
        } => {
            let call = CallStep {
                member,
                params: params.clone(),
                channel: *channel,
                name: name.as_deref().unwrap_or(member),
                expect: *expect,
                log: *log,
                detach: *detach,
                armed,
            };
            execute_call(harness, call).await
        }
        Step::Log { text } => {
            harness.log(text);
            Ok(())
        }
        Step::LogObject { value, title } => {
            harness.log_object(value, title.as_deref());
            Ok(())
        }
        Step::AddScript {
            source,
            url: Some(url),
            ..
        } => harness.add_script_with_url(source, url).await,
        Step::AddScript {
            source,
            url: None,
            line_offset,
            column_offset,
        } => harness.add_script(source, *line_offset, *column_offset).await,
        Step::AddModule {
            source,
            url,
            line_offset,
            column_offset,
        } => harness.add_module(source, url, *line_offset, *column_offset).await,
        Step::LoadScript { path } => {
            let path = if path.is_relative() {
                scenario_dir.join(path)
            } else {
                path.clone()
            };
            harness.load_script(&path).await
        }
        Step::WaitPendingTasks => {
            harness.wait_pending_tasks().await?;
            Ok(())
        }
        Step::SchedulePause {
            channel,
            reason,
            details,
        } => {
            harness
                .schedule_pause_on_next_statement(*channel, reason, details)
                .await
        }
        Step::CancelPause { channel } => harness.cancel_pause_on_next_statement(*channel).await,
        Step::CreateContextGroup => {
            let group = harness.create_context_group().await?;
            harness.log(&format!("Created context group {}", group));
            Ok(())
        }
    }
}

struct CallStep<'a> {
    member: &'a str,
    params: Option<Value>,
    channel: Option<ChannelId>,
    name: &'a str,
    expect: Option<Expectation>,
    log: LogMode,
    detach: bool,
    /// Waiter installed ahead of a preceding detached command
    armed: Option<EventWaiter>,
}

async fn execute_call(harness: &Harness, call: CallStep<'_>) -> Result<()> {
    let bound = bind(harness, call.member)?;
    if !matches!(bound, Bound::Command(_)) && call.expect.is_some() {
        return Err(Error::Scenario(format!(
            "'{}' is an event; expect applies only to commands",
            call.member
        )));
    }

    match bound {
        Bound::Command(command) => {
            let pending = command.invoke(call.params, call.channel);
            if call.detach {
                tracing::debug!(method = pending.method(), "Not waiting for response");
                return Ok(());
            }

            let response = pending.await?;
            let passed = match call.expect {
                Some(Expectation::Success) => harness.expect_success(call.name, &response).await,
                Some(Expectation::Error) => harness.expect_error(call.name, &response).await,
                None => true,
            };
            if !passed {
                return Ok(());
            }
            log_with_mode(harness, response.as_value(), call.log).await
        }
        Bound::Once(once) => {
            let waiter = call.armed.unwrap_or_else(|| once.wait());
            if call.detach {
                let harness = harness.clone();
                let log = call.log;
                tokio::spawn(async move {
                    match waiter.await {
                        Ok(event) => {
                            if let Err(e) = log_with_mode(&harness, event.as_value(), log).await {
                                tracing::warn!("Logging detached event failed: {}", e);
                            }
                        }
                        Err(e) => tracing::debug!("Detached waiter ended: {}", e),
                    }
                });
                return Ok(());
            }

            let event = waiter.await?;
            log_with_mode(harness, event.as_value(), call.log).await
        }
        Bound::Subscribe(subscribe) => {
            let log = call.log;
            if log == LogMode::SourceLocation {
                return Err(Error::Scenario(format!(
                    "'{}' cannot log source locations from a persistent handler",
                    call.member
                )));
            }
            if call.detach {
                return Err(Error::Scenario(format!(
                    "'{}' registers a handler; detach does not apply",
                    call.member
                )));
            }
            let harness = harness.clone();
            subscribe.register(move |event| match log {
                LogMode::None => {}
                LogMode::CallFrames => {
                    let frames = event.params()["callFrames"]
                        .as_array()
                        .cloned()
                        .unwrap_or_default();
                    harness.log_call_frames(&frames);
                }
                _ => {
                    harness.log_message(event.as_value());
                }
            });
            Ok(())
        }
    }
}

/// Log a response or event the way the step asked for
async fn log_with_mode(harness: &Harness, message: &Value, mode: LogMode) -> Result<()> {
    match mode {
        LogMode::None => {}
        LogMode::Message => {
            harness.log_message(message);
        }
        LogMode::Result => {
            harness.log_message(message.get("result").unwrap_or(&Value::Null));
        }
        LogMode::CallFrames => {
            let frames = message
                .pointer("/params/callFrames")
                .and_then(|f| f.as_array())
                .ok_or_else(|| Error::TestAssertion("message has no call frames".to_string()))?;
            harness.log_call_frames(frames);
        }
        LogMode::SourceLocation => {
            let location = first_location(message)
                .ok_or_else(|| Error::TestAssertion("message has no location".to_string()))?;
            harness.log_source_location(location).await?;
        }
    }
    Ok(())
}

/// Location of a paused event or a breakpoint response
fn first_location(message: &Value) -> Option<&Value> {
    ["/params/callFrames/0/location", "/result/actualLocation", "/result/locations/0"]
        .iter()
        .find_map(|pointer| message.pointer(pointer))
        .filter(|location| location.is_object())
}

/// First failure recorded in the transcript itself
fn transcript_failure(text: &str) -> Option<String> {
    text.lines()
        .find(|line| {
            line.starts_with("FAIL: ") || line.starts_with("Exception when dispatching message:")
        })
        .map(str::to_string)
}

/// First differing line, 1-based, with the expected and actual text
fn first_difference<'a>(expected: &'a str, actual: &'a str) -> Option<(usize, &'a str, &'a str)> {
    let mut want = expected.lines();
    let mut got = actual.lines();
    let mut line = 1;
    loop {
        match (want.next(), got.next()) {
            (None, None) => {
                return (expected.ends_with('\n') != actual.ends_with('\n'))
                    .then_some((line, "<end of file>", "<end of file>"));
            }
            (Some(w), Some(g)) if w == g => line += 1,
            (w, g) => {
                return Some((line, w.unwrap_or("<end of file>"), g.unwrap_or("<end of file>")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::BufferHost;
    use crate::protocol::Inbound;
    use crate::transport::ChannelTransport;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn steps(yaml: &str) -> Vec<Step> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn harness() -> (Harness, mpsc::UnboundedReceiver<(ChannelId, String)>) {
        let (transport, outbound) = ChannelTransport::new();
        let session = Session::new(Arc::new(transport));
        (Harness::new(session, Arc::new(BufferHost::new())), outbound)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_event_after_detached_command_is_not_lost() {
        let (harness, mut outbound) = harness();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let pump = harness.spawn_dispatch_loop(inbound);

        // Peer that pauses before answering each evaluate
        let peer = tokio::spawn(async move {
            while let Some((_, text)) = outbound.recv().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                let paused = json!({
                    "method": "Debugger.paused",
                    "params": {"reason": "other", "callFrames": []}
                });
                let _ = inbound_tx.send(Inbound::Json(paused));
                let _ = inbound_tx.send(Inbound::Json(json!({"id": request["id"], "result": {}})));
            }
        });

        let steps = steps(
            r#"
- action: call
  member: Runtime.evaluate
  params: {expression: "debugger;"}
  detach: true
- action: call
  member: Debugger.oncePaused
"#,
        );
        let rounds = async {
            for _ in 0..500 {
                run_steps(&harness, &steps, Path::new(".")).await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(20), rounds)
            .await
            .expect("a paused event was dispatched before its waiter existed");

        pump.abort();
        peer.abort();
    }

    #[tokio::test]
    async fn test_expect_on_event_member_is_rejected() {
        let (harness, mut outbound) = harness();
        for yaml in [
            "- {action: call, member: Debugger.oncePaused, expect: success}",
            "- {action: call, member: Debugger.onPaused, expect: error}",
            "- {action: call, member: Debugger.onPaused, detach: true}",
        ] {
            let err = run_steps(&harness, &steps(yaml), Path::new("."))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Scenario(_)), "{yaml}: {err}");
        }
        assert!(!harness.session().has_listener("Debugger.paused"));
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_expectations_path() {
        assert_eq!(
            expectations_path(Path::new("tests/scenarios/pause.yaml"), "-expected.txt"),
            PathBuf::from("tests/scenarios/pause-expected.txt")
        );
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference("a\nb\n", "a\nb\n"), None);
        assert_eq!(first_difference("a\nb\n", "a\nc\n"), Some((2, "b", "c")));
        assert_eq!(
            first_difference("a\n", "a\nextra\n"),
            Some((2, "<end of file>", "extra"))
        );
        assert!(first_difference("a\n", "a").is_some());
    }

    #[test]
    fn test_transcript_failure() {
        assert_eq!(transcript_failure("PASS: one\nok\n"), None);
        assert_eq!(
            transcript_failure("PASS: one\nFAIL: two: {}\n").as_deref(),
            Some("FAIL: two: {}")
        );
    }

    #[test]
    fn test_first_location() {
        let location = json!({"scriptId": "1", "lineNumber": 2});
        let paused = json!({"method": "Debugger.paused", "params": {"callFrames": [{"location": location}]}});
        assert_eq!(first_location(&paused).unwrap()["lineNumber"], 2);

        let actual = json!({"scriptId": "1", "lineNumber": 4});
        let breakpoint = json!({"id": 3, "result": {"breakpointId": "b", "actualLocation": actual}});
        assert_eq!(first_location(&breakpoint).unwrap()["lineNumber"], 4);

        assert!(first_location(&json!({"id": 1, "result": {}})).is_none());
    }

    #[test]
    fn test_load_scenario_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_scenario(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(Error::FileRead { .. })));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "name: x\ntests: 7\n").unwrap();
        assert!(matches!(load_scenario(&bad), Err(Error::Scenario(_))));
    }
}
