//! The session's debuggee model: cursor, breakpoints, code history and the execution pass.

use condor_debugger::{
    DebugLauncher, DebugTarget, Interpreter, OutputStream, ProbeScope, TargetEvent, VariableView,
};
use condor_generation::GenerationClient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::breakpoints::{
    AccessType, Breakpoint, BreakpointTable, DataBreakpoints, InstructionBreakpoints,
};
use crate::context::ExecutionContextBuilder;
use crate::error::{Result, RuntimeError};
use crate::events::{OutputCategory, RuntimeEvent, StopReason};
use crate::source::SourceDocument;
use crate::storage::{normalize_path, FileAccessor};
use crate::variable::{RuntimeValue, RuntimeVariable};

/// Fixed name of the persisted generated program inside the storage directory.
pub const GENERATED_FILE_NAME: &str = "condor-temp-generated.py";

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[a-z]+").expect("valid word regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Loaded,
    Running,
    Stopped(StopReason),
    Ended,
}

/// Collaborators the runtime drives.
#[derive(Clone)]
pub struct RuntimeServices {
    pub storage: Arc<dyn FileAccessor>,
    pub generation: Arc<GenerationClient>,
    pub launcher: Arc<dyn DebugLauncher>,
    pub interpreter: Interpreter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Directory receiving the generated program file
    pub storage_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionFilters {
    /// Condition of the named-exception filter, when enabled
    pub named: Option<String>,
    /// Catch-all filter
    pub other: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFrame {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub line: usize,
    pub column: Option<usize>,
    /// Instruction counter exposed when the line asks for disassembly
    pub instruction: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStack {
    pub frames: Vec<RuntimeFrame>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInTarget {
    pub id: usize,
    pub label: String,
}

/// One line of generated code presented as a machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInstruction {
    pub address: i64,
    pub instruction: String,
    /// Source line the instruction belongs to; `None` for addresses outside the code
    pub line: Option<usize>,
}

/// How a cursor walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Stop(StopReason),
    End,
}

pub struct Runtime {
    services: RuntimeServices,
    context_builder: ExecutionContextBuilder,
    settings: RuntimeSettings,
    events: mpsc::UnboundedSender<RuntimeEvent>,

    state: RuntimeState,
    document: Option<SourceDocument>,
    source_key: String,
    current_line: usize,
    current_column: Option<usize>,
    instruction: i64,
    debug: bool,

    breakpoints: BreakpointTable,
    data_breakpoints: DataBreakpoints,
    instruction_breakpoints: InstructionBreakpoints,
    exception_filters: ExceptionFilters,

    context: Option<String>,
    history: Vec<String>,
    executed_len: usize,
    last_code: Option<String>,
    target: Option<Arc<dyn DebugTarget>>,
    last_exception: Arc<Mutex<Option<String>>>,
    locals: Vec<RuntimeVariable>,
}

impl Runtime {
    pub fn new(
        services: RuntimeServices,
        settings: RuntimeSettings,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> Self {
        let context_builder = ExecutionContextBuilder::new(
            Arc::clone(&services.storage),
            Arc::clone(&services.generation),
        );
        Self {
            services,
            context_builder,
            settings,
            events,
            state: RuntimeState::Idle,
            document: None,
            source_key: String::new(),
            current_line: 0,
            current_column: None,
            instruction: 0,
            debug: true,
            breakpoints: BreakpointTable::new(),
            data_breakpoints: DataBreakpoints::default(),
            instruction_breakpoints: InstructionBreakpoints::new(),
            exception_filters: ExceptionFilters::default(),
            context: None,
            history: Vec::new(),
            executed_len: 0,
            last_code: None,
            target: None,
            last_exception: Arc::new(Mutex::new(None)),
            locals: Vec::new(),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn document(&self) -> Option<&SourceDocument> {
        self.document.as_ref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.document.as_ref().map(SourceDocument::path)
    }

    pub fn current_line(&self) -> usize {
        self.current_line
    }

    pub fn current_column(&self) -> Option<usize> {
        self.current_column
    }

    pub fn instruction(&self) -> i64 {
        self.instruction
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn generated_file(&self) -> PathBuf {
        self.settings.storage_dir.join(GENERATED_FILE_NAME)
    }

    fn key(&self, path: &Path) -> String {
        normalize_path(
            &path.to_string_lossy(),
            self.services.storage.is_windows(),
        )
    }

    fn emit(&self, event: RuntimeEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Runtime event dropped: no listener");
        }
    }

    fn emit_output(&self, category: OutputCategory, text: String) {
        self.emit(RuntimeEvent::Output {
            category,
            text,
            path: self.source_path().map(|p| p.display().to_string()),
            line: self.current_line,
            column: self.current_column.unwrap_or(0),
        });
    }

    fn current_text(&self) -> &str {
        self.document
            .as_ref()
            .and_then(|doc| doc.line(self.current_line).ok())
            .unwrap_or("")
    }

    /// Make `path` the active document. Re-loading the active path is a no-op.
    async fn load_source(&mut self, path: &Path) -> Result<()> {
        let key = self.key(path);
        if self.document.is_some() && key == self.source_key {
            return Ok(());
        }
        let doc = SourceDocument::load(self.services.storage.as_ref(), path).await?;
        log::info!("Loaded program {} ({} lines)", path.display(), doc.len());
        self.document = Some(doc);
        self.source_key = key;
        self.context = None;
        self.current_line = 0;
        self.current_column = None;
        if self.state == RuntimeState::Idle {
            self.state = RuntimeState::Loaded;
        }
        Ok(())
    }

    /// Load `program` and start it: park on the first statement or run to the first stop.
    pub async fn start(&mut self, program: &Path, stop_on_entry: bool, debug: bool) -> Result<()> {
        self.load_source(program).await?;
        self.debug = debug;
        if debug {
            self.verify_breakpoints(program).await;
            if stop_on_entry {
                let halt = self
                    .find_next_statement(false, Some(StopReason::Entry))
                    .unwrap_or(Halt::Stop(StopReason::Entry));
                self.finish(halt);
                return Ok(());
            }
        }
        self.continue_execution(false).await
    }

    /// Run forward (or backward) until a breakpoint or a document boundary.
    pub async fn continue_execution(&mut self, reverse: bool) -> Result<()> {
        if self.document.is_none() {
            return Err(RuntimeError::NotLoaded);
        }
        if self.state == RuntimeState::Ended && !reverse {
            self.emit(RuntimeEvent::End);
            return Ok(());
        }
        self.state = RuntimeState::Running;
        let halt = loop {
            self.execute_line(self.current_line);
            if let Some(halt) = self.update_current_line(reverse) {
                break halt;
            }
            if let Some(halt) = self.find_next_statement(reverse, None) {
                break halt;
            }
        };
        self.execute_pending().await;
        self.finish(halt);
        Ok(())
    }

    /// Step one statement, or one instruction when `instruction` is set.
    pub async fn step(&mut self, instruction: bool, reverse: bool) -> Result<()> {
        if self.document.is_none() {
            return Err(RuntimeError::NotLoaded);
        }
        if instruction {
            self.instruction += if reverse { -1 } else { 1 };
            self.finish(Halt::Stop(StopReason::Step));
            return Ok(());
        }
        if self.state == RuntimeState::Ended && !reverse {
            self.emit(RuntimeEvent::End);
            return Ok(());
        }
        self.state = RuntimeState::Running;
        self.execute_line(self.current_line);
        let halt = match self.update_current_line(reverse) {
            Some(halt) => halt,
            None => self
                .find_next_statement(reverse, Some(StopReason::Step))
                .unwrap_or(Halt::Stop(StopReason::Step)),
        };
        self.execute_pending().await;
        self.finish(halt);
        Ok(())
    }

    /// Move the column one character right, or to `target` (a step-in target id).
    pub fn step_in(&mut self, target: Option<usize>) {
        match (target, self.current_column) {
            (Some(column), _) => self.current_column = Some(column),
            (None, Some(column)) => {
                if column <= self.current_text().len() {
                    self.current_column = Some(column + 1);
                }
            }
            (None, None) => self.current_column = Some(1),
        }
        self.finish(Halt::Stop(StopReason::Step));
    }

    /// Move the column one character left; reaching 0 clears it.
    pub fn step_out(&mut self) {
        if let Some(column) = self.current_column {
            self.current_column = column.checked_sub(1).filter(|c| *c > 0);
        }
        self.finish(Halt::Stop(StopReason::Step));
    }

    /// Every character of the frame's word is a step-in target.
    pub fn step_in_targets(&self, frame_id: usize) -> Vec<StepInTarget> {
        let Some(word) = WORD.find_iter(self.current_text()).nth(frame_id) else {
            return Vec::new();
        };
        word.as_str()
            .chars()
            .enumerate()
            .map(|(ix, c)| StepInTarget {
                id: word.start() + ix,
                label: format!("target: {c}"),
            })
            .collect()
    }

    /// Frames are the words of the current line, followed by a `BOTTOM` sentinel.
    pub fn stack(&self, start: usize, end: usize) -> RuntimeStack {
        let text = self.current_text();
        let mut words: Vec<&str> = WORD.find_iter(text).map(|m| m.as_str()).collect();
        words.push("BOTTOM");
        let disassembly = text.contains("disassembly");
        let path = self.source_path().map(Path::to_path_buf).unwrap_or_default();

        let frames = (start..end.min(words.len()))
            .map(|i| RuntimeFrame {
                index: i,
                name: format!("{}({i})", words[i]),
                path: path.clone(),
                line: self.current_line,
                column: self.current_column,
                instruction: disassembly.then_some(self.instruction + i as i64),
            })
            .collect();
        RuntimeStack {
            frames,
            count: words.len(),
        }
    }

    /// Lines of the most recently generated code, addressed by zero-based line number.
    ///
    /// Always returns `count` entries; addresses outside the code are placeholders.
    pub fn disassemble(&self, address: i64, count: usize) -> Vec<RuntimeInstruction> {
        let code: Vec<&str> = self
            .last_code
            .as_deref()
            .map(|code| code.lines().collect())
            .unwrap_or_default();
        (address..)
            .take(count)
            .map(|addr| {
                match usize::try_from(addr).ok().and_then(|ix| code.get(ix)) {
                    Some(text) => RuntimeInstruction {
                        address: addr,
                        instruction: text.to_string(),
                        line: Some(self.current_line),
                    },
                    None => RuntimeInstruction {
                        address: addr,
                        instruction: String::new(),
                        line: None,
                    },
                }
            })
            .collect()
    }

    fn execute_line(&mut self, line: usize) {
        let text = match self.document.as_ref().map(|doc| doc.line(line)) {
            Some(Ok(text)) if !text.is_empty() => text.to_string(),
            _ => return,
        };
        log::debug!("Executing line {line}: {text}");
        self.history.push(text);
    }

    fn update_current_line(&mut self, reverse: bool) -> Option<Halt> {
        let len = self.document.as_ref().map_or(0, SourceDocument::len);
        if reverse {
            if self.current_line > 0 {
                self.current_line -= 1;
                None
            } else {
                self.current_line = 0;
                self.current_column = None;
                Some(Halt::Stop(StopReason::Entry))
            }
        } else if self.current_line + 1 < len {
            self.current_line += 1;
            None
        } else {
            self.current_column = None;
            Some(Halt::End)
        }
    }

    /// Walk from the cursor to the next breakpoint or non-empty line.
    ///
    /// A breakpoint wins over content, so one on a blank line still halts.
    fn find_next_statement(&mut self, reverse: bool, step: Option<StopReason>) -> Option<Halt> {
        let len = self.document.as_ref().map_or(0, SourceDocument::len);
        let mut ln = self.current_line;
        while ln < len {
            if let Some((bp, newly)) = self.breakpoints.hit(&self.source_key, ln) {
                if newly {
                    self.emit(RuntimeEvent::BreakpointValidated {
                        path: self.source_key.clone(),
                        breakpoint: bp,
                    });
                }
                self.current_line = ln;
                return Some(Halt::Stop(StopReason::Breakpoint));
            }
            let has_content = self
                .document
                .as_ref()
                .and_then(|doc| doc.line(ln).ok())
                .is_some_and(|text| !text.is_empty());
            if has_content {
                self.current_line = ln;
                break;
            }
            if reverse {
                match ln.checked_sub(1) {
                    Some(prev) => ln = prev,
                    None => break,
                }
            } else {
                ln += 1;
            }
        }
        step.map(Halt::Stop)
    }

    fn finish(&mut self, halt: Halt) {
        match halt {
            Halt::Stop(reason) => {
                self.state = RuntimeState::Stopped(reason);
                self.emit(RuntimeEvent::Stopped(reason));
            }
            Halt::End => {
                self.state = RuntimeState::Ended;
                self.emit(RuntimeEvent::End);
            }
        }
    }

    /// One execution pass: regenerate code for the whole history and hand it to the target.
    ///
    /// Runs only when the history grew since the previous pass. Failures are reported as
    /// output and never change the session state.
    async fn execute_pending(&mut self) {
        if self.history.len() == self.executed_len {
            return;
        }
        self.executed_len = self.history.len();
        let Some(path) = self.source_path().map(Path::to_path_buf) else {
            return;
        };

        if self.context.is_none() {
            self.context = Some(self.context_builder.build(&path).await);
        }
        let context = self.context.as_deref().unwrap_or_default();
        let prompt = format!("{context}\n{}", self.history.join("\n"));

        let Some(code) = self.services.generation.generate_code(&prompt).await else {
            log::info!("No code generated for {} lines; skipping execution", self.history.len());
            return;
        };
        self.last_code = Some(code.clone());

        let file = self.generated_file();
        if let Err(err) = self.services.storage.write_file(&file, code.as_bytes()).await {
            log::error!("Failed to persist generated code to {}: {err}", file.display());
            self.emit_output(
                OutputCategory::Important,
                format!("condor: could not save generated code to {}: {err}\n", file.display()),
            );
            return;
        }

        if self.debug {
            self.relaunch(&code).await;
        } else {
            self.run_once(&file).await;
        }
    }

    async fn relaunch(&mut self, code: &str) {
        self.stop_target().await;
        *self.last_exception.lock().await = None;

        let (tx, rx) = mpsc::unbounded_channel();
        match self.services.launcher.launch(code, tx).await {
            Ok(target) => {
                self.target = Some(target);
                tokio::spawn(forward_target_events(
                    rx,
                    self.events.clone(),
                    Arc::clone(&self.last_exception),
                    self.source_path().map(|p| p.display().to_string()),
                    self.current_line,
                ));
            }
            Err(err) => {
                log::error!("Failed to launch debugger: {err}");
                self.emit_output(
                    OutputCategory::Stderr,
                    format!("condor: failed to start the debugger: {err}\n"),
                );
            }
        }
    }

    async fn run_once(&mut self, file: &Path) {
        match self.services.interpreter.run_file(file).await {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    self.emit_output(OutputCategory::Stdout, output.stdout.clone());
                }
                if output.is_error() {
                    let summary = output
                        .stderr
                        .lines()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .map(|l| l.trim().to_string());
                    *self.last_exception.lock().await = summary;
                    self.emit_output(OutputCategory::Stderr, output.stderr);
                }
            }
            Err(err) => {
                log::error!("Failed to run generated code: {err}");
                self.emit_output(OutputCategory::Stderr, format!("condor: {err}\n"));
            }
        }
    }

    async fn stop_target(&mut self) {
        if let Some(target) = self.target.take() {
            if let Err(err) = target.shutdown().await {
                log::warn!("Debugger shutdown failed: {err}");
            }
        }
        self.locals.clear();
    }

    /// Tear the session down: stop the target and forget the executed lines.
    pub async fn shutdown(&mut self) {
        self.stop_target().await;
        self.history.clear();
        self.executed_len = 0;
        self.state = RuntimeState::Ended;
    }

    // breakpoints

    /// Add a breakpoint and re-verify the file's breakpoints.
    pub async fn set_breakpoint(&mut self, path: &Path, line: usize) -> Breakpoint {
        let key = self.key(path);
        let bp = self.breakpoints.add(&key, line);
        self.verify_breakpoints(path).await;
        self.breakpoints
            .find(&key, bp.id)
            .cloned()
            .unwrap_or(bp)
    }

    pub fn clear_breakpoint(&mut self, path: &Path, line: usize) -> Option<Breakpoint> {
        let key = self.key(path);
        self.breakpoints.remove(&key, line)
    }

    pub fn clear_breakpoints(&mut self, path: &Path) {
        let key = self.key(path);
        self.breakpoints.clear(&key);
    }

    pub fn breakpoints(&self, path: &Path) -> Vec<Breakpoint> {
        self.breakpoints.get(&self.key(path)).to_vec()
    }

    /// Verify the breakpoints of `path`. Other files are read for the check without
    /// becoming the active document.
    pub async fn verify_breakpoints(&mut self, path: &Path) {
        let key = self.key(path);
        let verified = if key == self.source_key {
            match self.document.as_ref() {
                Some(doc) => self.breakpoints.verify(&key, doc),
                None => Vec::new(),
            }
        } else {
            match SourceDocument::load(self.services.storage.as_ref(), path).await {
                Ok(doc) => self.breakpoints.verify(&key, &doc),
                Err(err) => {
                    log::debug!("Cannot verify breakpoints yet: {err}");
                    Vec::new()
                }
            }
        };
        for breakpoint in verified {
            self.emit(RuntimeEvent::BreakpointValidated {
                path: key.clone(),
                breakpoint,
            });
        }
    }

    pub fn set_data_breakpoint(&mut self, data_id: &str, access: AccessType) -> bool {
        self.data_breakpoints.set(data_id, access);
        true
    }

    pub fn data_breakpoint(&self, data_id: &str) -> Option<AccessType> {
        self.data_breakpoints.get(data_id)
    }

    pub fn clear_data_breakpoints(&mut self) {
        self.data_breakpoints.clear();
    }

    pub fn set_instruction_breakpoint(&mut self, address: i64) -> bool {
        self.instruction_breakpoints.insert(address);
        true
    }

    pub fn clear_instruction_breakpoints(&mut self) {
        self.instruction_breakpoints.clear();
    }

    pub fn set_exception_filters(&mut self, named: Option<String>, other: bool) {
        self.exception_filters = ExceptionFilters { named, other };
    }

    pub fn exception_filters(&self) -> &ExceptionFilters {
        &self.exception_filters
    }

    pub async fn last_exception(&self) -> Option<String> {
        self.last_exception.lock().await.clone()
    }

    // variables

    /// Variables of `scope` through `view`. Probe failures are logged and yield nothing.
    pub async fn variables(&mut self, scope: ProbeScope, view: VariableView) -> Vec<RuntimeVariable> {
        let is_locals = scope == ProbeScope::Locals && view == VariableView::Variables;
        let Some(target) = self.target.clone() else {
            return if is_locals { self.locals.clone() } else { Vec::new() };
        };
        match target.probe(scope).await {
            Ok(map) => {
                let vars = RuntimeVariable::from_scope(&view.filter(map));
                if is_locals {
                    self.locals = vars.clone();
                }
                vars
            }
            Err(err) => {
                log::warn!("Variable probe for {scope:?} failed: {err}");
                Vec::new()
            }
        }
    }

    /// Last known value of a local, without probing.
    pub fn local_variable(&self, name: &str) -> Option<&RuntimeVariable> {
        self.locals.iter().find(|v| v.name == name)
    }

    pub fn locals(&self) -> &[RuntimeVariable] {
        &self.locals
    }

    /// Update a local in the cache and, best effort, in the running target.
    pub async fn set_variable(&mut self, name: &str, value: RuntimeValue) -> RuntimeVariable {
        let var = RuntimeVariable::new(name, value);
        match self.locals.iter_mut().find(|v| v.name == name) {
            Some(existing) => *existing = var.clone(),
            None => self.locals.push(var.clone()),
        }
        self.push_assignment(&var).await;
        var
    }

    /// Overwrite part of a string local's bytes; returns the number of bytes written.
    pub async fn write_memory(&mut self, name: &str, offset: usize, data: &[u8]) -> Option<usize> {
        let var = self.locals.iter_mut().find(|v| v.name == name)?;
        if var.memory().is_none() {
            return None;
        }
        let written = var.set_memory(offset, data);
        let var = var.clone();
        self.push_assignment(&var).await;
        Some(written)
    }

    async fn push_assignment(&self, var: &RuntimeVariable) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        if let Err(err) = target.assign(&var.name, &var.to_python_literal()).await {
            log::warn!("Could not assign {} in the target: {err}", var.name);
        }
    }
}

async fn forward_target_events(
    mut rx: mpsc::UnboundedReceiver<TargetEvent>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    last_exception: Arc<Mutex<Option<String>>>,
    path: Option<String>,
    line: usize,
) {
    while let Some(event) = rx.recv().await {
        match event {
            TargetEvent::Output { stream, text } => {
                let category = match stream {
                    OutputStream::Stdout => OutputCategory::Stdout,
                    OutputStream::Stderr => OutputCategory::Stderr,
                };
                let _ = events.send(RuntimeEvent::Output {
                    category,
                    text,
                    path: path.clone(),
                    line,
                    column: 0,
                });
            }
            TargetEvent::Exception { summary } => {
                log::info!("Target raised: {summary}");
                *last_exception.lock().await = Some(summary);
            }
            TargetEvent::Exited { code } => {
                log::info!("Debug target exited (code {code:?})");
            }
        }
    }
}
