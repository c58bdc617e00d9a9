use async_trait::async_trait;
use condor_debugger::{
    DebugLauncher, DebugTarget, DebuggerError, Interpreter, InterpreterConfig, ProbeScope,
    TargetEvents, VariableView,
};
use condor_generation::{
    ChatModel, CompletionRequest, EchoModel, GenerationClient, GenerationConfig, GenerationError,
    RequestKind,
};
use condor_runtime::{
    LocalFileAccessor, OutputCategory, Runtime, RuntimeEvent, RuntimeServices, RuntimeSettings,
    RuntimeState, RuntimeValue, StopReason, GENERATED_FILE_NAME,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

struct CountingModel {
    code_calls: AtomicUsize,
    answer: Option<String>,
}

impl CountingModel {
    fn answering(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            code_calls: AtomicUsize::new(0),
            answer: answer.map(str::to_string),
        })
    }

    fn calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, request: &CompletionRequest) -> condor_generation::Result<String> {
        if request.kind == RequestKind::Classify {
            return Ok("False".to_string());
        }
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| GenerationError::unavailable("offline"))
    }
}

struct FakeTarget {
    scope: Map<String, Value>,
    assigned: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl DebugTarget for FakeTarget {
    async fn probe(&self, scope: ProbeScope) -> condor_debugger::Result<Map<String, Value>> {
        match scope {
            ProbeScope::Locals => Ok(self.scope.clone()),
            ProbeScope::Globals => Err(DebuggerError::parse("garbled")),
        }
    }

    async fn assign(&self, name: &str, value: &str) -> condor_debugger::Result<()> {
        self.assigned
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn shutdown(&self) -> condor_debugger::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeLauncher {
    launched: Mutex<Vec<String>>,
    assigned: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeLauncher {
    fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DebugLauncher for FakeLauncher {
    async fn launch(
        &self,
        code: &str,
        _events: TargetEvents,
    ) -> condor_debugger::Result<Arc<dyn DebugTarget>> {
        self.launched.lock().unwrap().push(code.to_string());
        let scope = json!({
            "count": 3,
            "name": "abc",
            "helper": "<function helper at 0x7f>",
        });
        Ok(Arc::new(FakeTarget {
            scope: scope.as_object().cloned().unwrap_or_default(),
            assigned: Arc::clone(&self.assigned),
        }))
    }
}

struct Harness {
    runtime: Runtime,
    events: mpsc::UnboundedReceiver<RuntimeEvent>,
    launcher: Arc<FakeLauncher>,
    program: PathBuf,
    dir: TempDir,
}

impl Harness {
    fn drain(&mut self) -> Vec<RuntimeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn stops(&mut self) -> Vec<RuntimeEvent> {
        self.drain()
            .into_iter()
            .filter(|e| matches!(e, RuntimeEvent::Stopped(_) | RuntimeEvent::End))
            .collect()
    }
}

fn harness(text: &str, model: Arc<dyn ChatModel>) -> Harness {
    harness_with(text, model, None)
}

fn harness_with(text: &str, model: Arc<dyn ChatModel>, storage_dir: Option<PathBuf>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let program = dir.path().join("program.txt");
    std::fs::write(&program, text).expect("write program");

    let launcher = Arc::new(FakeLauncher::default());
    let services = RuntimeServices {
        storage: Arc::new(LocalFileAccessor),
        generation: Arc::new(GenerationClient::with_model(GenerationConfig::echo(), model)),
        launcher: Arc::clone(&launcher) as Arc<dyn DebugLauncher>,
        interpreter: Interpreter::new(InterpreterConfig {
            program: "condor-no-such-python".to_string(),
            ..InterpreterConfig::default()
        }),
    };
    let settings = RuntimeSettings {
        storage_dir: storage_dir.unwrap_or_else(|| dir.path().join("storage")),
    };
    let (tx, events) = mpsc::unbounded_channel();
    Harness {
        runtime: Runtime::new(services, settings, tx),
        events,
        launcher,
        program,
        dir,
    }
}

#[tokio::test]
async fn breakpoint_stop_without_executed_lines_skips_generation() {
    let model = CountingModel::answering(Some("print(1)"));
    let mut h = harness("\nprint(1)\nprint(2)", model.clone());
    let program = h.program.clone();

    let bp = h.runtime.set_breakpoint(&program, 1).await;
    assert!(bp.verified);
    h.runtime.start(&program, false, true).await.unwrap();

    let events = h.drain();
    assert!(matches!(events.first(), Some(RuntimeEvent::BreakpointValidated { .. })));
    assert_eq!(
        events.last(),
        Some(&RuntimeEvent::Stopped(StopReason::Breakpoint))
    );
    assert_eq!(h.runtime.current_line(), 1);
    assert!(h.runtime.history().is_empty());
    assert_eq!(model.calls(), 0);
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test]
async fn unavailable_generation_still_advances_without_output() {
    let model = CountingModel::answering(None);
    let mut h = harness("a\nb", model.clone());
    let program = h.program.clone();

    h.runtime.start(&program, true, true).await.unwrap();
    assert_eq!(h.stops(), vec![RuntimeEvent::Stopped(StopReason::Entry)]);

    h.runtime.continue_execution(false).await.unwrap();
    let events = h.drain();
    assert_eq!(events, vec![RuntimeEvent::End]);
    assert_eq!(h.runtime.history(), ["a".to_string(), "b".to_string()]);
    assert_eq!(h.runtime.state(), RuntimeState::Ended);
    assert_eq!(model.calls(), 1);
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test]
async fn step_runs_history_through_generation_and_debugger() {
    let mut h = harness("x = 1\n\ny = 2", Arc::new(EchoModel));
    let program = h.program.clone();

    h.runtime.start(&program, true, true).await.unwrap();
    h.runtime.step(false, false).await.unwrap();

    assert_eq!(h.stops(), vec![
        RuntimeEvent::Stopped(StopReason::Entry),
        RuntimeEvent::Stopped(StopReason::Step),
    ]);
    assert_eq!(h.runtime.current_line(), 2);
    assert_eq!(h.runtime.history(), ["x = 1".to_string()]);

    let launched = h.launcher.launched();
    assert_eq!(launched.len(), 1);
    assert!(launched[0].ends_with("x = 1"));

    let persisted = std::fs::read_to_string(h.dir.path().join("storage").join(GENERATED_FILE_NAME))
        .expect("generated file");
    assert_eq!(persisted, launched[0]);
    assert!(h.runtime.has_target());
}

#[tokio::test]
async fn reverse_continue_from_first_line_stops_on_entry() {
    let mut h = harness("one\ntwo", Arc::new(EchoModel));
    let program = h.program.clone();

    h.runtime.start(&program, true, true).await.unwrap();
    h.drain();
    h.runtime.continue_execution(true).await.unwrap();

    assert_eq!(h.stops(), vec![RuntimeEvent::Stopped(StopReason::Entry)]);
    assert_eq!(h.runtime.current_line(), 0);
    assert_eq!(h.runtime.current_column(), None);
}

#[tokio::test]
async fn instruction_step_only_moves_the_counter() {
    let model = CountingModel::answering(Some("pass"));
    let mut h = harness("alpha\nbeta", model.clone());
    let program = h.program.clone();

    h.runtime.start(&program, true, true).await.unwrap();
    h.drain();
    h.runtime.step(true, false).await.unwrap();
    h.runtime.step(true, false).await.unwrap();
    h.runtime.step(true, true).await.unwrap();

    assert_eq!(h.runtime.instruction(), 1);
    assert_eq!(h.runtime.current_line(), 0);
    assert_eq!(h.stops().len(), 3);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn continue_after_end_does_not_reexecute_the_last_line() {
    let mut h = harness("only", Arc::new(EchoModel));
    let program = h.program.clone();

    h.runtime.start(&program, false, true).await.unwrap();
    h.runtime.continue_execution(false).await.unwrap();

    assert_eq!(h.stops(), vec![RuntimeEvent::End, RuntimeEvent::End]);
    assert_eq!(h.runtime.history(), ["only".to_string()]);
    assert_eq!(h.launcher.launched().len(), 1);
}

#[tokio::test]
async fn breakpoints_in_other_files_do_not_switch_the_document() {
    let mut h = harness("main line", Arc::new(EchoModel));
    let program = h.program.clone();
    let other = h.dir.path().join("other.txt");
    std::fs::write(&other, "\n+skip\nthird").unwrap();

    h.runtime.start(&program, true, true).await.unwrap();
    let bp = h.runtime.set_breakpoint(&other, 0).await;

    assert!(bp.verified);
    assert_eq!(bp.line, 1);
    assert_eq!(h.runtime.source_path(), Some(program.as_path()));
}

#[tokio::test]
async fn unsaved_generated_code_is_reported_and_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let mut h = harness_with("x = 1\ny = 2", Arc::new(EchoModel), Some(blocker));
    let program = h.program.clone();
    h.runtime.start(&program, true, true).await.unwrap();
    h.runtime.step(false, false).await.unwrap();

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::Output { category: OutputCategory::Important, .. }
    )));
    assert_eq!(events.last(), Some(&RuntimeEvent::Stopped(StopReason::Step)));
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test]
async fn no_debug_run_reports_interpreter_failures_as_output() {
    let mut h = harness("print(1)", Arc::new(EchoModel));
    let program = h.program.clone();

    h.runtime.start(&program, false, false).await.unwrap();

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::Output { category: OutputCategory::Stderr, text, .. } if text.starts_with("condor:")
    )));
    assert_eq!(events.last(), Some(&RuntimeEvent::End));
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test]
async fn variables_come_from_the_target_and_assignments_flow_back() {
    let mut h = harness("x = 1\ny = 2", Arc::new(EchoModel));
    let program = h.program.clone();
    h.runtime.start(&program, true, true).await.unwrap();
    h.runtime.step(false, false).await.unwrap();

    let mut names: Vec<String> = h
        .runtime
        .variables(ProbeScope::Locals, VariableView::Variables)
        .await
        .into_iter()
        .map(|v| v.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["count".to_string(), "name".to_string()]);

    let methods = h
        .runtime
        .variables(ProbeScope::Locals, VariableView::Methods)
        .await;
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].name, "helper");

    // unparsable scopes degrade to nothing
    assert!(h
        .runtime
        .variables(ProbeScope::Globals, VariableView::Variables)
        .await
        .is_empty());

    h.runtime.set_variable("count", RuntimeValue::Integer(7)).await;
    assert_eq!(
        h.runtime.local_variable("count").map(|v| v.value.clone()),
        Some(RuntimeValue::Integer(7))
    );
    assert_eq!(h.runtime.write_memory("name", 1, b"Z").await, Some(1));
    assert_eq!(
        h.runtime.local_variable("name").map(|v| v.value.clone()),
        Some(RuntimeValue::String("aZc".to_string()))
    );

    let assigned = h.launcher.assigned.lock().unwrap().clone();
    assert_eq!(assigned, vec![
        ("count".to_string(), "7".to_string()),
        ("name".to_string(), "\"aZc\"".to_string()),
    ]);
}

#[tokio::test]
async fn step_in_and_out_move_the_column() {
    let mut h = harness("ab cd", Arc::new(EchoModel));
    let program = h.program.clone();
    h.runtime.start(&program, true, true).await.unwrap();

    h.runtime.step_in(None);
    assert_eq!(h.runtime.current_column(), Some(1));
    h.runtime.step_in(Some(4));
    assert_eq!(h.runtime.current_column(), Some(4));
    h.runtime.step_out();
    assert_eq!(h.runtime.current_column(), Some(3));

    let targets = h.runtime.step_in_targets(1);
    let labels: Vec<_> = targets.iter().map(|t| (t.id, t.label.as_str())).collect();
    assert_eq!(labels, vec![(3, "target: c"), (4, "target: d")]);

    let stack = h.runtime.stack(0, 10);
    let names: Vec<_> = stack.frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["ab(0)", "cd(1)", "BOTTOM(2)"]);
    assert_eq!(stack.count, 3);
}

#[tokio::test]
async fn disassembly_addresses_generated_lines() {
    let mut h = harness("a = 1\nb = 2", Arc::new(EchoModel));
    let program = h.program.clone();
    h.runtime.start(&program, false, true).await.unwrap();

    // echo generation: leading blank line from the empty context, then both lines
    let instructions = h.runtime.disassemble(1, 4);
    let texts: Vec<_> = instructions.iter().map(|i| i.instruction.as_str()).collect();
    assert_eq!(texts, vec!["a = 1", "b = 2", "", ""]);
    assert_eq!(instructions[0].address, 1);
    assert!(instructions[1].line.is_some());
    assert_eq!(instructions[2].line, None);
    assert_eq!(h.runtime.disassemble(-1, 1)[0].line, None);
}
