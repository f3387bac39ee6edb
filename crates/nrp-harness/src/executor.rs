// SPDX-License-Identifier: Apache-2.0

//! Runs the user's main script on a dedicated OS thread named
//! `MainScriptThread` (spec §4.5), inside a `rhai` engine with `nrp` (the
//! [`EngineWrapper`]) and a script-local `log` bound into scope. Classifies
//! the script's outcome per spec §4.5's exception table and hands the
//! result back to the harness via callback, never touching the lifecycle
//! FSM directly (it lives on a different thread/owner — spec §9).

use crate::engine::EngineClient;
use crate::messages::ErrorKind;
use crate::wrapper::{EngineWrapper, RunLoopSignal, SimulationTimeout, StopExecution};
use rhai::{Dynamic, Engine, EvalAltResult, ParseError, Position, Scope, AST};
use std::sync::Arc;

/// A script-local logger writing to `<script>_<sim_id>.log`. Deliberately
/// independent of the process-wide `tracing` subscriber (spec §4.5: "does
/// not propagate to stdout").
#[derive(Clone)]
pub struct ScriptLogger {
    file: Arc<parking_lot::Mutex<std::fs::File>>,
}

impl ScriptLogger {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Arc::new(parking_lot::Mutex::new(file)) })
    }

    pub fn log(&self, message: &str) {
        use std::io::Write;
        let mut file = self.file.lock();
        let _ = writeln!(file, "[{}] {}", chrono::Utc::now().to_rfc3339(), message);
    }
}

/// What to fire on the worker's lifecycle FSM once the executor settles, if
/// anything (spec §4.5's exception table; `Stopped` fires nothing because
/// the `stop` hook that set the flag is already driving the transition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorTrigger {
    Completed,
    Failed,
}

/// A script-originated error to publish on the runtime-error topic.
#[derive(Debug, Clone)]
pub struct ScriptFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub line_number: usize,
    pub offset: usize,
    pub line_text: String,
}

impl ScriptFailure {
    fn without_position(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), line_number: 0, offset: 0, line_text: String::new() }
    }
}

/// Outcome of one full executor-thread run.
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    pub trigger: Option<ExecutorTrigger>,
    pub error: Option<ScriptFailure>,
}

/// Compile the script's source for syntax only (spec §4.5's "parse it for
/// syntax" in the `initialize` hook, before any execution is attempted).
pub fn compile(engine: &Engine, source: &str) -> Result<AST, ScriptFailure> {
    engine.compile(source).map_err(|err| parse_error_to_failure(&err, source))
}

fn parse_error_to_failure(err: &ParseError, source: &str) -> ScriptFailure {
    let position = err.1;
    ScriptFailure {
        kind: ErrorKind::Compile,
        message: err.0.to_string(),
        line_number: position.line().unwrap_or(0),
        offset: position.position().unwrap_or(0),
        line_text: line_at(source, position.line()),
    }
}

fn line_at(source: &str, line_number: Option<usize>) -> String {
    match line_number {
        Some(n) if n > 0 => source.lines().nth(n - 1).unwrap_or_default().to_string(),
        _ => String::new(),
    }
}

/// Build a `rhai::Engine` exposing `nrp` and `log` to the script. Engine
/// modules are never registered, so there is nothing to `import` from the
/// script's namespace (spec §9: hiding them is defence-in-depth, not a
/// security boundary — a systems rewrite need not replicate it faithfully).
fn build_engine<E: EngineClient + 'static>() -> Engine {
    let mut engine = Engine::new();

    engine.register_type_with_name::<EngineWrapper<E>>("EngineWrapper");
    engine.register_fn("run_loop", |wrapper: &mut EngineWrapper<E>| run_loop(wrapper, 1, None));
    engine.register_fn("run_loop", |wrapper: &mut EngineWrapper<E>, n: i64| run_loop(wrapper, n.max(0) as u64, None));
    engine.register_fn("run_loop", |wrapper: &mut EngineWrapper<E>, n: i64, data: Dynamic| {
        run_loop(wrapper, n.max(0) as u64, Some(data))
    });
    engine.register_get("simulation_time", |w: &mut EngineWrapper<E>| w.simulation_time());
    engine.register_get("simulation_time_remaining", |w: &mut EngineWrapper<E>| w.simulation_time_remaining());
    engine.register_get("real_time", |w: &mut EngineWrapper<E>| w.real_time());

    for name in ["stop", "reset", "shutdown", "initialize"] {
        engine.register_fn(name, move |_w: &mut EngineWrapper<E>| -> Result<(), Box<EvalAltResult>> {
            Err(format!("`{name}` is not available on `nrp`; the user script may only step").into())
        });
    }

    engine
}

fn run_loop<E: EngineClient + 'static>(
    wrapper: &mut EngineWrapper<E>,
    n: u64,
    data: Option<Dynamic>,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let data = data.and_then(|d| rhai::serde::from_dynamic::<serde_json::Value>(&d).ok());
    match wrapper.run_loop(n, data) {
        Ok(Some(value)) => rhai::serde::to_dynamic(&value).map_err(Into::into),
        Ok(None) => Ok(Dynamic::UNIT),
        Err(RunLoopSignal::Stopped(signal)) => {
            Err(Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(signal), Position::NONE)))
        }
        Err(RunLoopSignal::TimedOut(signal)) => {
            Err(Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(signal), Position::NONE)))
        }
        Err(RunLoopSignal::EngineError(error)) => Err(error.to_string().into()),
    }
}

const COMPILE_CLASS_MESSAGE_HINTS: &[&str] =
    &["Function not found", "Variable not found", "mismatched", "indexing"];

fn classify_error(err: &EvalAltResult, source: &str) -> ExecutorResult {
    if let EvalAltResult::ErrorRuntime(dynamic, _) = err {
        if dynamic.clone().try_cast::<StopExecution>().is_some() {
            return ExecutorResult { trigger: None, error: None };
        }
        if dynamic.clone().try_cast::<SimulationTimeout>().is_some() {
            return ExecutorResult {
                trigger: Some(ExecutorTrigger::Completed),
                error: Some(ScriptFailure::without_position(
                    ErrorKind::SimTimeout,
                    "configured simulation timeout was reached",
                )),
            };
        }
        let message = dynamic.clone().into_string().unwrap_or_else(|_| dynamic.to_string());
        return ExecutorResult {
            trigger: Some(ExecutorTrigger::Failed),
            error: Some(ScriptFailure::without_position(ErrorKind::Runtime, message)),
        };
    }

    let position = err.position();
    let message = err.to_string();
    // rhai classes that correspond to the source's "syntax/name/attribute"
    // grouping (spec §4.5): anything else raised by the script itself is a
    // plain runtime error.
    // Either class terminates the script and drives the worker to `failed`
    // (spec §4.5's table; only `StopExecution` and `SimulationTimeout`,
    // handled above, diverge from that).
    let is_name_or_attribute_error = COMPILE_CLASS_MESSAGE_HINTS.iter().any(|hint| message.contains(hint));
    let kind = if is_name_or_attribute_error { ErrorKind::Compile } else { ErrorKind::Runtime };

    ExecutorResult {
        trigger: Some(ExecutorTrigger::Failed),
        error: Some(ScriptFailure {
            kind,
            message,
            line_number: position.line().unwrap_or(0),
            offset: position.position().unwrap_or(0),
            line_text: line_at(source, position.line()),
        }),
    }
}

/// Spawn the executor thread. `on_result` is invoked exactly once, from
/// `MainScriptThread`, once the script has fully terminated (normally,
/// cooperatively stopped, timed out, or errored).
pub fn spawn<E: EngineClient + 'static>(
    source: String,
    ast: AST,
    wrapper: EngineWrapper<E>,
    logger: ScriptLogger,
    on_result: Arc<dyn Fn(ExecutorResult) + Send + Sync>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new().name("MainScriptThread".to_string()).spawn(move || {
        let mut engine = build_engine::<E>();
        let mut scope = Scope::new();
        scope.push("nrp", wrapper);

        let logger_for_fn = logger.clone();
        engine.register_fn("log", move |msg: &str| logger_for_fn.log(msg));

        let result = match engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(_) => {
                logger.log("script returned normally");
                ExecutorResult { trigger: Some(ExecutorTrigger::Completed), error: None }
            }
            Err(err) => {
                let classified = classify_error(&err, &source);
                logger.log(&format!("script terminated: {err}"));
                classified
            }
        };
        on_result(result);
    })
}
