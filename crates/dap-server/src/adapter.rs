//! Request handlers: translate protocol requests into runtime calls and runtime events back
//! into protocol events.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use condor_debugger::{ProbeScope, VariableView};
use condor_protocol::{
    Breakpoint, BreakpointEventBody, BreakpointLocation, BreakpointLocationsArguments,
    Capabilities, CancelArguments, CompletionItem, CompletionsArguments,
    DataBreakpointInfoArguments, DisassembleArguments, DisassembledInstruction, EvaluateArguments,
    Event, ExceptionBreakpointsFilter, ExceptionDetails, InitializeArguments,
    InvalidatedEventBody, LaunchArguments, OutputEventBody, ProgressEndEventBody,
    ProgressStartEventBody, ProgressUpdateEventBody, ReadMemoryArguments, Request, Response, Scope,
    SetBreakpointsArguments, SetDataBreakpointsArguments, SetExceptionBreakpointsArguments,
    SetExpressionArguments, SetFunctionBreakpointsArguments, SetInstructionBreakpointsArguments,
    SetVariableArguments, Source, StackFrame, StackTraceArguments, StepArguments,
    StepInArguments, StepInTargetsArguments, StoppedEventBody, TerminatedEventBody, Thread,
    VariablesArguments, WriteMemoryArguments,
};
use condor_runtime::{
    AccessType, Breakpoint as RuntimeBreakpoint, Runtime, RuntimeError, RuntimeEvent,
    RuntimeValue, RuntimeVariable,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

use crate::config::AdapterConfig;
use crate::coords::Coordinates;
use crate::error::{
    AdapterError, Result, MEMORY_NOT_FOUND, NOT_ASSIGNABLE, UNKNOWN_COMMAND, VARIABLE_NOT_FOUND,
};
use crate::handles::{Handles, VariableContainer};
use crate::values::{format_address, parse_value, to_protocol_variable, MemoryReference};

/// The only thread the adapter reports.
pub const THREAD_ID: i64 = 1;

const FIRST_PROGRESS_ID: u64 = 10000;

static NEW_BREAKPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new +([0-9]+)").expect("valid new-breakpoint regex"));
static DEL_BREAKPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"del +([0-9]+)").expect("valid del-breakpoint regex"));

/// Result of one request: its response, then the events to write after it.
#[derive(Debug)]
pub struct Outcome {
    pub response: Response,
    pub events: Vec<Event>,
    /// Stop serving once this outcome is written
    pub shutdown: bool,
}

impl Outcome {
    fn reply(request: &Request, body: Option<Value>) -> Self {
        Self {
            response: Response::success(request, body),
            events: Vec::new(),
            shutdown: false,
        }
    }

    fn failed(request: &Request, err: &AdapterError) -> Self {
        Self {
            response: Response::error(request, err.to_message()),
            events: Vec::new(),
            shutdown: false,
        }
    }

    fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }
}

fn parse_args<T: DeserializeOwned>(request: &Request) -> Result<T> {
    request
        .parse_arguments()
        .map_err(|e| AdapterError::invalid_arguments(&request.command, e))
}

fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_evaluate_for_hovers: Some(true),
        supports_step_back: Some(true),
        supports_data_breakpoints: Some(true),
        supports_completions_request: Some(true),
        completion_trigger_characters: Some(vec![".".to_string(), "[".to_string()]),
        supports_cancel_request: Some(true),
        supports_breakpoint_locations_request: Some(true),
        supports_step_in_targets_request: Some(true),
        supports_exception_filter_options: Some(true),
        exception_breakpoint_filters: Some(vec![
            ExceptionBreakpointsFilter {
                filter: "namedException".to_string(),
                label: "Named Exception".to_string(),
                description: Some(
                    "Break on named exceptions. Enter the exception's name as the Condition."
                        .to_string(),
                ),
                default: Some(false),
                supports_condition: Some(true),
                condition_description: Some("Enter the exception's name".to_string()),
            },
            ExceptionBreakpointsFilter {
                filter: "otherExceptions".to_string(),
                label: "Other Exceptions".to_string(),
                description: Some("Break on any other exception".to_string()),
                default: Some(true),
                supports_condition: Some(false),
                condition_description: None,
            },
        ]),
        supports_exception_info_request: Some(true),
        supports_set_variable: Some(true),
        supports_set_expression: Some(true),
        supports_disassemble_request: Some(true),
        supports_stepping_granularity: Some(true),
        supports_instruction_breakpoints: Some(true),
        supports_read_memory_request: Some(true),
        supports_write_memory_request: Some(true),
        support_suspend_debuggee: Some(true),
        support_terminate_debuggee: Some(true),
        supports_function_breakpoints: Some(true),
        supports_delayed_stack_trace_loading: Some(true),
    }
}

fn protocol_breakpoint(bp: &RuntimeBreakpoint, coords: Coordinates, path: Option<&str>) -> Breakpoint {
    Breakpoint {
        id: Some(bp.id),
        verified: bp.verified,
        line: Some(coords.to_client_line(bp.line)),
        source: path.map(Source::from_path),
        ..Breakpoint::default()
    }
}

fn breakpoint_event(reason: &str, breakpoint: Breakpoint) -> Event {
    Event::with_body(
        "breakpoint",
        &BreakpointEventBody {
            reason: reason.to_string(),
            breakpoint,
        },
    )
}

fn invalidated_variables() -> Event {
    Event::with_body(
        "invalidated",
        &InvalidatedEventBody {
            areas: Some(vec!["variables".to_string()]),
            thread_id: None,
        },
    )
}

fn console_output(text: String) -> Event {
    Event::with_body(
        "output",
        &OutputEventBody {
            category: Some("console".to_string()),
            output: text,
            source: None,
            line: None,
            column: None,
        },
    )
}

fn not_assignable(expression: &str) -> AdapterError {
    AdapterError::with_expression(NOT_ASSIGNABLE, "'{lexpr}' not an assignable expression", expression)
}

fn not_found(expression: &str) -> AdapterError {
    AdapterError::with_expression(VARIABLE_NOT_FOUND, "variable '{lexpr}' not found", expression)
}

struct AdapterState {
    coords: Coordinates,
    handles: Handles<VariableContainer>,
    report_progress: bool,
    use_invalidated: bool,
    values_in_hex: bool,
    cancelled_requests: HashSet<i64>,
    cancelled_progress: Option<String>,
    next_progress_id: u64,
    progress_cancellable: bool,
}

impl Default for AdapterState {
    fn default() -> Self {
        Self {
            coords: Coordinates::default(),
            handles: Handles::default(),
            report_progress: false,
            use_invalidated: false,
            values_in_hex: false,
            cancelled_requests: HashSet::new(),
            cancelled_progress: None,
            next_progress_id: FIRST_PROGRESS_ID,
            progress_cancellable: true,
        }
    }
}

/// One debug session's request handler.
pub struct Adapter {
    runtime: Mutex<Runtime>,
    state: Mutex<AdapterState>,
    config: AdapterConfig,
    configuration_done: watch::Sender<bool>,
    /// Events raised outside any request (progress demo)
    events: mpsc::UnboundedSender<Event>,
}

impl Adapter {
    pub fn new(runtime: Runtime, config: AdapterConfig, events: mpsc::UnboundedSender<Event>) -> Self {
        let (configuration_done, _) = watch::channel(false);
        Self {
            runtime: Mutex::new(runtime),
            state: Mutex::new(AdapterState::default()),
            config,
            configuration_done,
            events,
        }
    }

    async fn coords(&self) -> Coordinates {
        self.state.lock().await.coords
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::debug!("Adapter event dropped: transport gone");
        }
    }

    /// Handle every request except `launch`/`attach`, which go through [`Adapter::launch`].
    pub async fn handle(self: &Arc<Self>, request: &Request) -> Outcome {
        if self.state.lock().await.cancelled_requests.remove(&request.seq) {
            return Outcome {
                response: Response::failure(request, "cancelled"),
                events: Vec::new(),
                shutdown: false,
            };
        }
        let result = match request.command.as_str() {
            "initialize" => self.initialize(request).await,
            "configurationDone" => self.configuration_done(request),
            "setBreakpoints" => self.set_breakpoints(request).await,
            "setFunctionBreakpoints" => self.set_function_breakpoints(request),
            "setExceptionBreakpoints" => self.set_exception_breakpoints(request).await,
            "exceptionInfo" => self.exception_info(request).await,
            "breakpointLocations" => self.breakpoint_locations(request).await,
            "threads" => Ok(self.threads(request)),
            "stackTrace" => self.stack_trace(request).await,
            "scopes" => self.scopes(request).await,
            "variables" => self.variables(request).await,
            "setVariable" => self.set_variable(request).await,
            "continue" => self.resume(request, false).await,
            "reverseContinue" => self.resume(request, true).await,
            "next" => self.step(request, false).await,
            "stepBack" => self.step(request, true).await,
            "stepIn" => self.step_in(request).await,
            "stepOut" => self.step_out(request).await,
            "stepInTargets" => self.step_in_targets(request).await,
            "evaluate" => self.evaluate(request).await,
            "setExpression" => self.set_expression(request).await,
            "completions" => self.completions(request).await,
            "dataBreakpointInfo" => self.data_breakpoint_info(request).await,
            "setDataBreakpoints" => self.set_data_breakpoints(request).await,
            "disassemble" => self.disassemble(request).await,
            "setInstructionBreakpoints" => self.set_instruction_breakpoints(request).await,
            "readMemory" => self.read_memory(request).await,
            "writeMemory" => self.write_memory(request).await,
            "cancel" => self.cancel(request).await,
            "disconnect" => self.disconnect(request).await,
            "toggleFormatting" => self.toggle_formatting(request).await,
            other => Err(AdapterError::protocol(
                UNKNOWN_COMMAND,
                format!("unrecognized request '{other}'"),
            )),
        };
        result.unwrap_or_else(|err| {
            log::warn!("Request '{}' failed: {err}", request.command);
            Outcome::failed(request, &err)
        })
    }

    /// Wait (bounded) until the front end finished configuration.
    pub async fn wait_for_configuration(&self) {
        let mut done = self.configuration_done.subscribe();
        let wait = self.config.configuration_done_wait();
        let finished = tokio::time::timeout(wait, done.wait_for(|d| *d))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !finished {
            log::debug!("configurationDone not received within {wait:?}; starting anyway");
        }
    }

    /// Start the program of a `launch` or `attach` request.
    pub async fn launch(&self, request: &Request) -> Outcome {
        if self.state.lock().await.cancelled_requests.remove(&request.seq) {
            return Outcome {
                response: Response::failure(request, "cancelled"),
                events: Vec::new(),
                shutdown: false,
            };
        }
        self.start_program(request).await.unwrap_or_else(|err| {
            log::error!("Launch failed: {err}");
            Outcome::failed(request, &err)
        })
    }

    async fn start_program(&self, request: &Request) -> Result<Outcome> {
        let args: LaunchArguments = parse_args(request)?;
        if args.program.trim().is_empty() {
            return Err(AdapterError::invalid_arguments(&request.command, "missing 'program'"));
        }
        let debug = !args.no_debug.unwrap_or(false);
        log::info!("Launching {} (debug: {debug})", args.program);
        self.runtime
            .lock()
            .await
            .start(Path::new(&args.program), args.stop_on_entry.unwrap_or(false), debug)
            .await?;
        Ok(Outcome::reply(request, None))
    }

    /// Stop the debug target and forget the session's executed lines.
    pub async fn shutdown(&self) {
        self.runtime.lock().await.shutdown().await;
    }

    /// Protocol form of a runtime event.
    pub async fn runtime_event(&self, event: RuntimeEvent) -> Event {
        let coords = self.coords().await;
        match event {
            RuntimeEvent::Stopped(reason) => Event::with_body(
                "stopped",
                &StoppedEventBody::new(reason.as_protocol(), THREAD_ID),
            ),
            RuntimeEvent::BreakpointValidated { breakpoint, .. } => breakpoint_event(
                "changed",
                Breakpoint {
                    id: Some(breakpoint.id),
                    verified: breakpoint.verified,
                    line: Some(coords.to_client_line(breakpoint.line)),
                    ..Breakpoint::default()
                },
            ),
            RuntimeEvent::Output {
                category,
                mut text,
                path,
                line,
                column,
            } => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                Event::with_body(
                    "output",
                    &OutputEventBody {
                        category: Some(category.as_protocol().to_string()),
                        output: text,
                        source: path.as_deref().map(Source::from_path),
                        line: Some(coords.to_client_line(line)),
                        column: Some(coords.to_client_column(column)),
                    },
                )
            }
            RuntimeEvent::End => Event::with_body("terminated", &TerminatedEventBody::default()),
        }
    }

    async fn initialize(&self, request: &Request) -> Result<Outcome> {
        let args: InitializeArguments = parse_args(request)?;
        {
            let mut state = self.state.lock().await;
            state.coords = Coordinates {
                lines_start_at1: args.lines_start_at1.unwrap_or(true),
                columns_start_at1: args.columns_start_at1.unwrap_or(true),
            };
            state.report_progress = args.supports_progress_reporting.unwrap_or(false);
            state.use_invalidated = args.supports_invalidated_event.unwrap_or(false);
        }
        log::info!(
            "Client {} initialized the session",
            args.client_id.as_deref().unwrap_or("<unknown>")
        );
        let body = serde_json::to_value(capabilities())?;
        Ok(Outcome::reply(request, Some(body)).with_event(Event::new("initialized")))
    }

    fn threads(&self, request: &Request) -> Outcome {
        let threads = vec![Thread {
            id: THREAD_ID,
            name: "thread 1".to_string(),
        }];
        Outcome::reply(request, Some(json!({ "threads": threads })))
    }

    fn configuration_done(&self, request: &Request) -> Result<Outcome> {
        self.configuration_done.send_replace(true);
        Ok(Outcome::reply(request, None))
    }

    async fn set_breakpoints(&self, request: &Request) -> Result<Outcome> {
        let args: SetBreakpointsArguments = parse_args(request)?;
        let path = args
            .source
            .path
            .clone()
            .ok_or_else(|| AdapterError::invalid_arguments(&request.command, "missing source.path"))?;
        let lines: Vec<i64> = match (args.breakpoints, args.lines) {
            (Some(bps), _) => bps.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines,
            (None, None) => Vec::new(),
        };

        let coords = self.coords().await;
        let mut runtime = self.runtime.lock().await;
        runtime.clear_breakpoints(Path::new(&path));
        let mut breakpoints = Vec::with_capacity(lines.len());
        for line in lines {
            let bp = runtime
                .set_breakpoint(Path::new(&path), coords.from_client_line(line))
                .await;
            breakpoints.push(protocol_breakpoint(&bp, coords, Some(path.as_str())));
        }
        Ok(Outcome::reply(request, Some(json!({ "breakpoints": breakpoints }))))
    }

    fn set_function_breakpoints(&self, request: &Request) -> Result<Outcome> {
        let args: SetFunctionBreakpointsArguments = parse_args(request)?;
        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .map(|_| Breakpoint {
                verified: false,
                message: Some("function breakpoints are not supported".to_string()),
                ..Breakpoint::default()
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "breakpoints": breakpoints }))))
    }

    async fn set_exception_breakpoints(&self, request: &Request) -> Result<Outcome> {
        let args: SetExceptionBreakpointsArguments = parse_args(request)?;
        let mut named = None;
        let mut other = args.filters.iter().any(|f| f == "otherExceptions");
        for option in args.filter_options.unwrap_or_default() {
            match option.filter_id.as_str() {
                "namedException" => named = Some(option.condition.unwrap_or_default()),
                "otherExceptions" => other = true,
                _ => {}
            }
        }
        self.runtime.lock().await.set_exception_filters(named, other);
        Ok(Outcome::reply(request, None))
    }

    async fn exception_info(&self, request: &Request) -> Result<Outcome> {
        let runtime = self.runtime.lock().await;
        let break_mode = if runtime.exception_filters().other {
            "always"
        } else {
            "never"
        };
        let (exception_id, description) = match runtime.last_exception().await {
            Some(summary) => {
                let id = summary
                    .split(':')
                    .next()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                (id, summary)
            }
            None => (
                "none".to_string(),
                "No exception has been raised by the generated code.".to_string(),
            ),
        };
        let details = ExceptionDetails {
            message: Some(description.clone()),
            type_name: Some(exception_id.clone()),
            stack_trace: None,
        };
        Ok(Outcome::reply(
            request,
            Some(json!({
                "exceptionId": exception_id,
                "description": description,
                "breakMode": break_mode,
                "details": details,
            })),
        ))
    }

    async fn breakpoint_locations(&self, request: &Request) -> Result<Outcome> {
        let args: BreakpointLocationsArguments = parse_args(request)?;
        let coords = self.coords().await;
        let locations = match args.source.path {
            // only column 0 is a valid location
            Some(_) => vec![BreakpointLocation {
                line: args.line,
                column: Some(coords.to_client_column(0)),
            }],
            None => Vec::new(),
        };
        Ok(Outcome::reply(request, Some(json!({ "breakpoints": locations }))))
    }

    async fn stack_trace(&self, request: &Request) -> Result<Outcome> {
        let args: StackTraceArguments = parse_args(request)?;
        let start = usize::try_from(args.start_frame.unwrap_or(0)).unwrap_or(0);
        let levels = args
            .levels
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l > 0)
            .unwrap_or(1000);

        let coords = self.coords().await;
        let stack = self.runtime.lock().await.stack(start, start.saturating_add(levels));
        let frames: Vec<StackFrame> = stack
            .frames
            .iter()
            .map(|f| {
                let path = f.path.to_string_lossy();
                let mut frame = StackFrame {
                    id: f.index as i64,
                    name: f.name.clone(),
                    source: (!path.is_empty()).then(|| Source::from_path(&path)),
                    line: coords.to_client_line(f.line),
                    column: f.column.map(|c| coords.to_client_column(c)).unwrap_or(0),
                    instruction_pointer_reference: None,
                };
                if let Some(instruction) = f.instruction {
                    let address = format_address(instruction);
                    frame.name = format!("{} {address}", f.name);
                    frame.instruction_pointer_reference = Some(address);
                }
                frame
            })
            .collect();
        Ok(Outcome::reply(
            request,
            Some(json!({ "stackFrames": frames, "totalFrames": stack.count })),
        ))
    }

    async fn scopes(&self, request: &Request) -> Result<Outcome> {
        let mut state = self.state.lock().await;
        let scope = |name: &str, reference: i64, expensive: bool| Scope {
            name: name.to_string(),
            variables_reference: reference,
            expensive,
            presentation_hint: None,
        };
        let scopes = vec![
            scope("Locals", state.handles.lookup_or_create(VariableContainer::Locals), false),
            scope("Globals", state.handles.lookup_or_create(VariableContainer::Globals), true),
            scope("Methods", state.handles.lookup_or_create(VariableContainer::Methods), false),
        ];
        Ok(Outcome::reply(request, Some(json!({ "scopes": scopes }))))
    }

    async fn variables(&self, request: &Request) -> Result<Outcome> {
        let args: VariablesArguments = parse_args(request)?;
        let container = self
            .state
            .lock()
            .await
            .handles
            .get(args.variables_reference)
            .cloned();
        let vars = match container {
            Some(VariableContainer::Locals) => {
                self.probe(ProbeScope::Locals, VariableView::Variables).await
            }
            Some(VariableContainer::Globals) => {
                self.probe(ProbeScope::Globals, VariableView::Variables).await
            }
            Some(VariableContainer::Methods) => {
                self.probe(ProbeScope::Locals, VariableView::Methods).await
            }
            Some(VariableContainer::Variable(RuntimeVariable {
                value: RuntimeValue::Children(children) | RuntimeValue::Mapping(children),
                ..
            })) => children,
            _ => Vec::new(),
        };

        let start = args.start.and_then(|s| usize::try_from(s).ok()).unwrap_or(0);
        let count = args
            .count
            .and_then(|c| usize::try_from(c).ok())
            .filter(|c| *c > 0)
            .unwrap_or(usize::MAX);
        let mut state = self.state.lock().await;
        let hex = state.values_in_hex;
        let variables: Vec<_> = vars
            .iter()
            .skip(start)
            .take(count)
            .map(|v| to_protocol_variable(v, hex, &mut state.handles))
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "variables": variables }))))
    }

    async fn probe(&self, scope: ProbeScope, view: VariableView) -> Vec<RuntimeVariable> {
        self.runtime.lock().await.variables(scope, view).await
    }

    async fn describe(&self, var: &RuntimeVariable) -> Value {
        let mut state = self.state.lock().await;
        let hex = state.values_in_hex;
        let var = to_protocol_variable(var, hex, &mut state.handles);
        json!({
            "value": var.value,
            "type": var.type_,
            "variablesReference": var.variables_reference,
        })
    }

    async fn set_variable(&self, request: &Request) -> Result<Outcome> {
        let args: SetVariableArguments = parse_args(request)?;
        let value = parse_value(&args.value);
        let container = self
            .state
            .lock()
            .await
            .handles
            .get(args.variables_reference)
            .cloned();

        let updated = match container {
            Some(VariableContainer::Locals) => {
                let mut runtime = self.runtime.lock().await;
                if runtime.local_variable(&args.name).is_none() {
                    return Err(not_found(&args.name));
                }
                runtime.set_variable(&args.name, value).await
            }
            Some(VariableContainer::Variable(_)) => {
                let mut state = self.state.lock().await;
                let child = match state.handles.get_mut(args.variables_reference) {
                    Some(VariableContainer::Variable(RuntimeVariable {
                        value: RuntimeValue::Children(children) | RuntimeValue::Mapping(children),
                        ..
                    })) => children.iter_mut().find(|c| c.name == args.name),
                    _ => None,
                };
                let Some(child) = child else {
                    return Err(not_found(&args.name));
                };
                child.value = value;
                child.clone()
            }
            _ => return Err(not_assignable(&args.name)),
        };
        let body = self.describe(&updated).await;
        Ok(Outcome::reply(request, Some(body)))
    }

    async fn resume(&self, request: &Request, reverse: bool) -> Result<Outcome> {
        self.runtime.lock().await.continue_execution(reverse).await?;
        let body = (!reverse).then(|| json!({ "allThreadsContinued": true }));
        Ok(Outcome::reply(request, body))
    }

    async fn step(&self, request: &Request, reverse: bool) -> Result<Outcome> {
        let args: StepArguments = parse_args(request)?;
        self.runtime
            .lock()
            .await
            .step(args.is_instruction(), reverse)
            .await?;
        Ok(Outcome::reply(request, None))
    }

    async fn step_in(&self, request: &Request) -> Result<Outcome> {
        let args: StepInArguments = parse_args(request)?;
        let target = args.target_id.and_then(|t| usize::try_from(t).ok());
        self.runtime.lock().await.step_in(target);
        Ok(Outcome::reply(request, None))
    }

    async fn step_out(&self, request: &Request) -> Result<Outcome> {
        self.runtime.lock().await.step_out();
        Ok(Outcome::reply(request, None))
    }

    async fn step_in_targets(&self, request: &Request) -> Result<Outcome> {
        let args: StepInTargetsArguments = parse_args(request)?;
        let frame = usize::try_from(args.frame_id).unwrap_or(0);
        let targets: Vec<condor_protocol::StepInTarget> = self
            .runtime
            .lock()
            .await
            .step_in_targets(frame)
            .into_iter()
            .map(|t| condor_protocol::StepInTarget {
                id: t.id as i64,
                label: t.label,
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "targets": targets }))))
    }

    async fn evaluate(self: &Arc<Self>, request: &Request) -> Result<Outcome> {
        let args: EvaluateArguments = parse_args(request)?;
        let context = args.context.as_deref().unwrap_or("repl");
        let mut events = Vec::new();

        let reply = if context == "repl" {
            self.repl_command(&args.expression, &mut events).await?
        } else {
            None
        };
        let var = match &reply {
            Some(_) => None,
            None => match args.expression.strip_prefix('$') {
                Some(name) => self.runtime.lock().await.local_variable(name).cloned(),
                None => Some(RuntimeVariable::new("eval", parse_value(&args.expression))),
            },
        };

        let body = match var {
            Some(var) => {
                let described = self.describe(&var).await;
                json!({
                    "result": described["value"],
                    "type": described["type"],
                    "variablesReference": described["variablesReference"],
                })
            }
            None => json!({
                "result": reply.unwrap_or_else(|| {
                    format!("evaluate(context: '{context}', '{}')", args.expression)
                }),
                "variablesReference": 0,
            }),
        };
        let mut outcome = Outcome::reply(request, Some(body));
        outcome.events = events;
        Ok(outcome)
    }

    /// REPL pseudo-commands: `new N`, `del N` and `progress`.
    async fn repl_command(
        self: &Arc<Self>,
        expression: &str,
        events: &mut Vec<Event>,
    ) -> Result<Option<String>> {
        let client_line = |caps: regex::Captures<'_>| {
            caps[1]
                .parse::<i64>()
                .map_err(|e| AdapterError::invalid_arguments("evaluate", e))
        };

        if let Some(caps) = NEW_BREAKPOINT.captures(expression) {
            let line = client_line(caps)?;
            let coords = self.coords().await;
            let mut runtime = self.runtime.lock().await;
            let path = runtime
                .source_path()
                .map(Path::to_path_buf)
                .ok_or(RuntimeError::NotLoaded)?;
            let bp = runtime
                .set_breakpoint(&path, coords.from_client_line(line))
                .await;
            let path = path.to_string_lossy();
            events.push(breakpoint_event("new", protocol_breakpoint(&bp, coords, Some(&*path))));
            return Ok(Some("breakpoint created".to_string()));
        }

        if let Some(caps) = DEL_BREAKPOINT.captures(expression) {
            let line = client_line(caps)?;
            let coords = self.coords().await;
            let mut runtime = self.runtime.lock().await;
            let path = runtime
                .source_path()
                .map(Path::to_path_buf)
                .ok_or(RuntimeError::NotLoaded)?;
            return Ok(runtime
                .clear_breakpoint(&path, coords.from_client_line(line))
                .map(|bp| {
                    events.push(breakpoint_event(
                        "removed",
                        Breakpoint {
                            id: Some(bp.id),
                            verified: false,
                            ..Breakpoint::default()
                        },
                    ));
                    "breakpoint deleted".to_string()
                }));
        }

        if expression.contains("progress") {
            if !self.state.lock().await.report_progress {
                return Ok(Some(
                    "frontend doesn't support progress (capability 'supportsProgressReporting' not set)"
                        .to_string(),
                ));
            }
            let adapter = Arc::clone(self);
            tokio::spawn(async move { adapter.progress_sequence().await });
            return Ok(Some("progress started".to_string()));
        }

        Ok(None)
    }

    /// Demo progress sequence; polls the cancel table between steps.
    async fn progress_sequence(&self) {
        let (id, cancellable) = {
            let mut state = self.state.lock().await;
            let id = state.next_progress_id.to_string();
            state.next_progress_id += 1;
            let cancellable = state.progress_cancellable;
            state.progress_cancellable = !cancellable;
            (id, cancellable)
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let title = if cancellable {
            "Cancellable operation"
        } else {
            "Long running operation"
        };
        self.emit(Event::with_body(
            "progressStart",
            &ProgressStartEventBody {
                progress_id: id.clone(),
                title: title.to_string(),
                request_id: None,
                cancellable: Some(cancellable),
                message: None,
                percentage: None,
            },
        ));
        self.emit(console_output(format!("start progress: {id}\n")));

        let mut end_message = "progress ended";
        for step in 0..self.config.progress_steps {
            tokio::time::sleep(self.config.progress_step_delay()).await;
            self.emit(Event::with_body(
                "progressUpdate",
                &ProgressUpdateEventBody {
                    progress_id: id.clone(),
                    message: Some(format!("progress: {step}")),
                    percentage: None,
                },
            ));
            let cancelled = {
                let mut state = self.state.lock().await;
                let hit = state.cancelled_progress.as_deref() == Some(id.as_str());
                if hit {
                    state.cancelled_progress = None;
                }
                hit
            };
            if cancelled {
                end_message = "progress cancelled";
                self.emit(console_output(format!("cancel progress: {id}\n")));
                break;
            }
        }

        self.emit(Event::with_body(
            "progressEnd",
            &ProgressEndEventBody {
                progress_id: id.clone(),
                message: Some(end_message.to_string()),
            },
        ));
        self.emit(console_output(format!("end progress: {id}\n")));
        self.state.lock().await.cancelled_progress = None;
    }

    async fn set_expression(&self, request: &Request) -> Result<Outcome> {
        let args: SetExpressionArguments = parse_args(request)?;
        let Some(name) = args.expression.strip_prefix('$') else {
            return Err(not_assignable(&args.expression));
        };
        let updated = {
            let mut runtime = self.runtime.lock().await;
            if runtime.local_variable(name).is_none() {
                return Err(not_found(&args.expression));
            }
            runtime.set_variable(name, parse_value(&args.value)).await
        };
        let body = self.describe(&updated).await;
        Ok(Outcome::reply(request, Some(body)))
    }

    async fn completions(&self, request: &Request) -> Result<Outcome> {
        let args: CompletionsArguments = parse_args(request)?;
        let coords = self.coords().await;
        let cursor = coords.from_client_column(args.column);
        let typed: Vec<char> = args.text.chars().take(cursor).collect();
        let word_start = typed
            .iter()
            .rposition(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
            .map_or(0, |i| i + 1);
        let word: String = typed[word_start..].iter().collect();
        let prefix = word.trim_start_matches('$');

        let runtime = self.runtime.lock().await;
        let targets: Vec<CompletionItem> = runtime
            .locals()
            .iter()
            .filter(|v| v.name.starts_with(prefix))
            .map(|v| CompletionItem {
                label: format!("${}", v.name),
                text: Some(format!("${}", v.name)),
                sort_text: None,
                type_: Some("variable".to_string()),
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "targets": targets }))))
    }

    async fn data_breakpoint_info(&self, request: &Request) -> Result<Outcome> {
        let args: DataBreakpointInfoArguments = parse_args(request)?;
        let reference = args.variables_reference.filter(|r| *r != 0);
        let body = match reference {
            Some(reference) if !args.name.is_empty() => {
                let globals = matches!(
                    self.state.lock().await.handles.get(reference),
                    Some(VariableContainer::Globals)
                );
                let access_types = if globals {
                    vec!["write"]
                } else {
                    vec!["read", "write", "readWrite"]
                };
                json!({
                    "dataId": args.name,
                    "description": args.name,
                    "accessTypes": access_types,
                    "canPersist": true,
                })
            }
            _ => json!({
                "dataId": null,
                "description": "cannot break on data access",
                "canPersist": false,
            }),
        };
        Ok(Outcome::reply(request, Some(body)))
    }

    async fn set_data_breakpoints(&self, request: &Request) -> Result<Outcome> {
        let args: SetDataBreakpointsArguments = parse_args(request)?;
        let mut runtime = self.runtime.lock().await;
        runtime.clear_data_breakpoints();
        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .map(|dbp| {
                let access = dbp
                    .access_type
                    .as_deref()
                    .and_then(AccessType::parse)
                    .unwrap_or(AccessType::Write);
                Breakpoint {
                    verified: runtime.set_data_breakpoint(&dbp.data_id, access),
                    ..Breakpoint::default()
                }
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "breakpoints": breakpoints }))))
    }

    async fn disassemble(&self, request: &Request) -> Result<Outcome> {
        let args: DisassembleArguments = parse_args(request)?;
        let reference = MemoryReference::parse(&args.memory_reference).ok_or_else(|| {
            AdapterError::protocol(
                MEMORY_NOT_FOUND,
                format!("memory reference '{}' not found", args.memory_reference),
            )
        })?;
        let base = reference.address + args.instruction_offset.unwrap_or(0);
        let count = usize::try_from(args.instruction_count).unwrap_or(0);

        let coords = self.coords().await;
        let runtime = self.runtime.lock().await;
        let source = runtime
            .source_path()
            .map(|p| Source::from_path(&p.to_string_lossy()));
        let mut last_line = None;
        let instructions: Vec<DisassembledInstruction> = runtime
            .disassemble(base, count)
            .into_iter()
            .map(|ins| {
                let mut out = DisassembledInstruction {
                    address: reference.render(ins.address),
                    instruction: ins.instruction,
                    instruction_bytes: None,
                    location: None,
                    line: None,
                    presentation_hint: None,
                };
                match ins.line {
                    // source only on the first instruction of a line
                    Some(line) if last_line != Some(line) => {
                        last_line = Some(line);
                        out.location = source.clone();
                        out.line = Some(coords.to_client_line(line));
                    }
                    Some(_) => {}
                    None => out.presentation_hint = Some("invalid".to_string()),
                }
                out
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "instructions": instructions }))))
    }

    async fn set_instruction_breakpoints(&self, request: &Request) -> Result<Outcome> {
        let args: SetInstructionBreakpointsArguments = parse_args(request)?;
        let mut runtime = self.runtime.lock().await;
        runtime.clear_instruction_breakpoints();
        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .map(|ibp| {
                let verified = match MemoryReference::parse(&ibp.instruction_reference) {
                    Some(reference) => runtime
                        .set_instruction_breakpoint(reference.address + ibp.offset.unwrap_or(0)),
                    None => false,
                };
                Breakpoint {
                    verified,
                    instruction_reference: Some(ibp.instruction_reference.clone()),
                    ..Breakpoint::default()
                }
            })
            .collect();
        Ok(Outcome::reply(request, Some(json!({ "breakpoints": breakpoints }))))
    }

    /// Variable behind a memory reference (a variables handle).
    async fn memory_variable(&self, reference: &str) -> Result<RuntimeVariable> {
        let state = self.state.lock().await;
        match reference
            .parse::<i64>()
            .ok()
            .and_then(|handle| state.handles.get(handle))
        {
            Some(VariableContainer::Variable(var)) => Ok(var.clone()),
            _ => Err(AdapterError::protocol(
                MEMORY_NOT_FOUND,
                format!("memory reference '{reference}' not found"),
            )),
        }
    }

    async fn read_memory(&self, request: &Request) -> Result<Outcome> {
        let args: ReadMemoryArguments = parse_args(request)?;
        let snapshot = self.memory_variable(&args.memory_reference).await?;
        let offset = usize::try_from(args.offset.unwrap_or(0)).unwrap_or(0);
        let count = usize::try_from(args.count).unwrap_or(0);

        let runtime = self.runtime.lock().await;
        let var = runtime.local_variable(&snapshot.name).unwrap_or(&snapshot);
        let memory = var.memory().unwrap_or_default();
        let start = offset.min(memory.len());
        let end = offset.saturating_add(count).min(memory.len());
        let data = &memory[start..end];
        Ok(Outcome::reply(
            request,
            Some(json!({
                "address": offset.to_string(),
                "data": BASE64.encode(data),
                "unreadableBytes": count - data.len(),
            })),
        ))
    }

    async fn write_memory(&self, request: &Request) -> Result<Outcome> {
        let args: WriteMemoryArguments = parse_args(request)?;
        let data = BASE64
            .decode(args.data.as_bytes())
            .map_err(|e| AdapterError::invalid_arguments(&request.command, e))?;
        let snapshot = self.memory_variable(&args.memory_reference).await?;
        let offset = usize::try_from(args.offset.unwrap_or(0)).unwrap_or(0);

        let written = self
            .runtime
            .lock()
            .await
            .write_memory(&snapshot.name, offset, &data)
            .await
            .unwrap_or(0);
        Ok(
            Outcome::reply(request, Some(json!({ "bytesWritten": written })))
                .with_event(invalidated_variables()),
        )
    }

    async fn cancel(&self, request: &Request) -> Result<Outcome> {
        let args: CancelArguments = parse_args(request)?;
        let mut state = self.state.lock().await;
        if let Some(id) = args.request_id {
            state.cancelled_requests.insert(id);
        }
        if let Some(id) = args.progress_id {
            state.cancelled_progress = Some(id);
        }
        Ok(Outcome::reply(request, None))
    }

    async fn disconnect(&self, request: &Request) -> Result<Outcome> {
        self.shutdown().await;
        let mut outcome = Outcome::reply(request, None);
        outcome.shutdown = true;
        Ok(outcome)
    }

    async fn toggle_formatting(&self, request: &Request) -> Result<Outcome> {
        let mut state = self.state.lock().await;
        state.values_in_hex = !state.values_in_hex;
        let outcome = Outcome::reply(request, None);
        Ok(if state.use_invalidated {
            outcome.with_event(invalidated_variables())
        } else {
            outcome
        })
    }
}
