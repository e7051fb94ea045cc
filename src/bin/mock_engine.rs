//! Mock inspector engine for integration testing
//!
//! Speaks the framed envelope protocol on stdin/stdout and implements just
//! enough of the Debugger and Runtime domains to exercise the harness
//! without a real engine: scripts are recorded rather than executed, and a
//! `debugger` keyword in a script produces a pause.

use inspector::transport::process::Frame;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};

const WAIT_PENDING_TASKS_URL: &str = "wait-pending-tasks.js";
const METHOD_NOT_FOUND: i64 = -32601;
const SERVER_ERROR: i64 = -32000;

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    let mut state = MockState::default();

    loop {
        // Read Content-Length header
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).unwrap_or(0) == 0 {
            break; // EOF
        }

        if !header_line.starts_with("Content-Length:") {
            continue;
        }

        let content_length: usize = header_line
            .trim_start_matches("Content-Length:")
            .trim()
            .parse()
            .unwrap_or(0);

        // Read empty line
        let mut empty_line = String::new();
        reader.read_line(&mut empty_line).ok();

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let frame: Frame = match serde_json::from_slice(&body) {
            Ok(frame) => frame,
            Err(_) => continue,
        };

        for reply in state.process_frame(frame) {
            send_frame(&mut writer, &reply);
        }

        if state.quitting {
            break;
        }
    }
}

fn send_frame<W: Write>(writer: &mut W, frame: &Frame) {
    let Ok(body) = serde_json::to_string(frame) else {
        return;
    };
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).ok();
    writer.write_all(body.as_bytes()).ok();
    writer.flush().ok();
}

struct Script {
    id: String,
    url: String,
    source: String,
    line_offset: i64,
    column_offset: i64,
}

/// An evaluate call held back until the engine resumes
struct Deferred {
    channel: i32,
    id: Value,
    result: Value,
}

struct MockState {
    debugger_enabled: bool,
    scripts: Vec<Script>,
    next_script_id: u64,
    next_context_group: i64,
    scheduled_pauses: HashMap<i32, (String, String)>,
    paused: bool,
    deferred: Option<Deferred>,
    current_time_ms: f64,
    quitting: bool,
    out: Vec<Frame>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            debugger_enabled: false,
            scripts: Vec::new(),
            next_script_id: 1,
            next_context_group: 1,
            scheduled_pauses: HashMap::new(),
            paused: false,
            deferred: None,
            current_time_ms: 0.0,
            quitting: false,
            out: Vec::new(),
        }
    }
}

impl MockState {
    fn process_frame(&mut self, frame: Frame) -> Vec<Frame> {
        match frame {
            Frame::Protocol { channel, message } => {
                if let Ok(message) = serde_json::from_str::<Value>(&message) {
                    self.process_message(channel, &message);
                }
            }
            Frame::Control {
                id,
                command,
                arguments,
            } => {
                let reply = self.process_control(&command, &arguments);
                let frame = match reply {
                    Ok(result) => Frame::ControlResult {
                        id,
                        result: Some(result),
                        error: None,
                    },
                    Err(error) => Frame::ControlResult {
                        id,
                        result: None,
                        error: Some(error),
                    },
                };
                self.out.push(frame);
            }
            Frame::ControlResult { .. } => {}
        }
        std::mem::take(&mut self.out)
    }

    fn send(&mut self, channel: i32, message: Value) {
        self.out.push(Frame::Protocol {
            channel,
            message: message.to_string(),
        });
    }

    fn event(&mut self, channel: i32, method: &str, params: Value) {
        self.send(channel, json!({"method": method, "params": params}));
    }

    fn process_message(&mut self, channel: i32, message: &Value) {
        let Some(id) = message.get("id").cloned() else {
            return;
        };
        let method = message.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(json!({}));

        let result = match method {
            "Debugger.enable" => {
                self.debugger_enabled = true;
                let parsed: Vec<Value> = self.scripts.iter().map(script_parsed_params).collect();
                for params in parsed {
                    self.event(channel, "Debugger.scriptParsed", params);
                }
                Ok(json!({"debuggerId": "mock-debugger"}))
            }
            "Debugger.disable" => {
                self.debugger_enabled = false;
                Ok(json!({}))
            }
            "Debugger.resume" => {
                if self.paused {
                    self.paused = false;
                    self.event(channel, "Debugger.resumed", json!({}));
                    if let Some(deferred) = self.deferred.take() {
                        self.send(
                            deferred.channel,
                            json!({"id": deferred.id, "result": deferred.result}),
                        );
                    }
                    Ok(json!({}))
                } else {
                    Err((SERVER_ERROR, "Can only perform operation while paused.".to_string()))
                }
            }
            "Debugger.getScriptSource" => {
                let script_id = params.get("scriptId").and_then(|s| s.as_str()).unwrap_or("");
                match self.scripts.iter().find(|s| s.id == script_id) {
                    Some(script) => Ok(json!({"scriptSource": script.source})),
                    None => Err((SERVER_ERROR, format!("No script for id: {}", script_id))),
                }
            }
            "Runtime.enable" => {
                self.event(
                    channel,
                    "Runtime.executionContextCreated",
                    json!({"context": {"id": 1, "origin": "", "name": "mock"}}),
                );
                Ok(json!({}))
            }
            "Runtime.disable" => Ok(json!({})),
            "Runtime.evaluate" => {
                let expression = params
                    .get("expression")
                    .and_then(|e| e.as_str())
                    .unwrap_or("")
                    .to_string();
                let result = json!({"result": evaluate(&expression, self.current_time_ms)});

                let url = source_url(&expression).unwrap_or_default();
                if url == WAIT_PENDING_TASKS_URL {
                    self.compile(channel, &expression, &url, 0, 0, false);
                    Ok(result)
                } else if self.compile(channel, &expression, &url, 0, 0, false) {
                    // Answered on resume
                    self.deferred = Some(Deferred {
                        channel,
                        id,
                        result,
                    });
                    return;
                } else {
                    Ok(result)
                }
            }
            _ => Err((METHOD_NOT_FOUND, format!("'{}' wasn't found", method))),
        };

        let response = match result {
            Ok(result) => json!({"id": id, "result": result}),
            Err((code, message)) => json!({"id": id, "error": {"code": code, "message": message}}),
        };
        self.send(channel, response);
    }

    fn process_control(&mut self, command: &str, arguments: &Value) -> Result<Value, String> {
        match command {
            "compileAndRunWithOrigin" => {
                let source = arguments.get("source").and_then(|s| s.as_str()).unwrap_or("");
                let url = arguments.get("url").and_then(|s| s.as_str()).unwrap_or("");
                let line_offset = arguments.get("lineOffset").and_then(|v| v.as_i64()).unwrap_or(0);
                let column_offset = arguments
                    .get("columnOffset")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let is_module = arguments
                    .get("isModule")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.compile(0, source, url, line_offset, column_offset, is_module);
                Ok(json!({}))
            }
            "createContextGroup" => {
                let group = self.next_context_group;
                self.next_context_group += 1;
                Ok(json!({"contextGroupId": group}))
            }
            "schedulePauseOnNextStatement" => {
                let group = context_group(arguments);
                let reason = arguments
                    .get("breakReason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("other")
                    .to_string();
                let details = arguments
                    .get("breakDetails")
                    .and_then(|d| d.as_str())
                    .unwrap_or("{}")
                    .to_string();
                self.scheduled_pauses.insert(group, (reason, details));
                Ok(json!({}))
            }
            "cancelPauseOnNextStatement" => {
                self.scheduled_pauses.remove(&context_group(arguments));
                Ok(json!({}))
            }
            "reconnect" => Ok(json!({})),
            "setCurrentTimeMSForTest" => {
                self.current_time_ms = arguments
                    .get("time")
                    .and_then(|t| t.as_f64())
                    .unwrap_or(0.0);
                Ok(json!({}))
            }
            "quit" => {
                self.quitting = true;
                Ok(json!({}))
            }
            other => Err(format!("unknown control command '{}'", other)),
        }
    }

    /// Record a script and report it; returns true if running it paused
    fn compile(
        &mut self,
        channel: i32,
        source: &str,
        url: &str,
        line_offset: i64,
        column_offset: i64,
        is_module: bool,
    ) -> bool {
        let script = Script {
            id: self.next_script_id.to_string(),
            url: url.to_string(),
            source: source.to_string(),
            line_offset,
            column_offset,
        };
        self.next_script_id += 1;

        if self.debugger_enabled {
            let mut params = script_parsed_params(&script);
            params["isModule"] = json!(is_module);
            self.event(channel, "Debugger.scriptParsed", params);
        }

        let scheduled = self.scheduled_pauses.remove(&channel);
        let pause = match (&scheduled, find_debugger_statement(source)) {
            (Some((reason, details)), _) => Some((
                reason.clone(),
                serde_json::from_str(details).unwrap_or(Value::Null),
                (0, 0),
            )),
            (None, Some(position)) => Some(("other".to_string(), Value::Null, position)),
            (None, None) => None,
        };

        let paused = match pause {
            Some((reason, data, (line, column))) if self.debugger_enabled => {
                let line_number = line + script.line_offset;
                let column_number = if line == 0 {
                    column + script.column_offset
                } else {
                    column
                };
                let mut params = json!({
                    "callFrames": [{
                        "callFrameId": "0",
                        "functionName": "",
                        "location": {
                            "scriptId": script.id,
                            "lineNumber": line_number,
                            "columnNumber": column_number,
                        },
                        "url": script.url,
                        "scopeChain": [],
                        "this": {"type": "undefined"},
                    }],
                    "reason": reason,
                    "hitBreakpoints": [],
                });
                if !data.is_null() {
                    params["data"] = data;
                }
                self.paused = true;
                self.event(channel, "Debugger.paused", params);
                true
            }
            _ => false,
        };

        self.scripts.push(script);
        paused
    }
}

fn context_group(arguments: &Value) -> i32 {
    arguments
        .get("contextGroupId")
        .and_then(|g| g.as_i64())
        .and_then(|g| i32::try_from(g).ok())
        .unwrap_or(0)
}

fn script_parsed_params(script: &Script) -> Value {
    let lines: Vec<&str> = script.source.split('\n').collect();
    let last = lines.last().map(|l| l.chars().count() as i64).unwrap_or(0);
    let end_column = if lines.len() == 1 {
        last + script.column_offset
    } else {
        last
    };
    json!({
        "scriptId": script.id,
        "url": script.url,
        "startLine": script.line_offset,
        "startColumn": script.column_offset,
        "endLine": script.line_offset + lines.len() as i64 - 1,
        "endColumn": end_column,
        "executionContextId": 1,
        "hash": format!("{:08x}", script.source.len()),
        "isModule": false,
        "length": script.source.chars().count(),
    })
}

/// Zero-based line and column of the first `debugger` keyword
fn find_debugger_statement(source: &str) -> Option<(i64, i64)> {
    source.split('\n').enumerate().find_map(|(line, text)| {
        text.find("debugger").map(|byte| {
            let column = text[..byte].chars().count();
            (line as i64, column as i64)
        })
    })
}

/// Value of a trailing `//# sourceURL=` comment
fn source_url(expression: &str) -> Option<String> {
    expression
        .rsplit_once("//# sourceURL=")
        .map(|(_, url)| url.trim().to_string())
}

/// Evaluate literal expressions and `Date.now()`; anything else is `undefined`
fn evaluate(expression: &str, now_ms: f64) -> Value {
    let trimmed = expression.trim().trim_end_matches(';');
    if trimmed == "Date.now()" {
        return json!({"type": "number", "value": now_ms, "description": now_ms.to_string()});
    }
    if let Ok(number) = trimmed.parse::<i64>() {
        return json!({"type": "number", "value": number, "description": trimmed});
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        return json!({"type": "number", "value": number, "description": trimmed});
    }
    if trimmed.len() >= 2 {
        let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\''));
        if quoted {
            return json!({"type": "string", "value": &trimmed[1..trimmed.len() - 1]});
        }
    }
    match trimmed {
        "true" | "false" => json!({"type": "boolean", "value": trimmed == "true"}),
        "null" => json!({"type": "object", "subtype": "null", "value": null}),
        _ => json!({"type": "undefined"}),
    }
}
