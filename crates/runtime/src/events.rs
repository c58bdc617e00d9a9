use crate::breakpoints::Breakpoint;

/// Why execution is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    DataBreakpoint,
    InstructionBreakpoint,
    Exception,
}

impl StopReason {
    /// Reason string of the protocol's `stopped` event.
    pub fn as_protocol(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::DataBreakpoint => "data breakpoint",
            StopReason::InstructionBreakpoint => "instruction breakpoint",
            StopReason::Exception => "exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stdout,
    Stderr,
    Console,
    Important,
}

impl OutputCategory {
    pub fn as_protocol(self) -> &'static str {
        match self {
            OutputCategory::Stdout => "stdout",
            OutputCategory::Stderr => "stderr",
            OutputCategory::Console => "console",
            OutputCategory::Important => "important",
        }
    }
}

/// Everything the runtime reports to its host, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Stopped(StopReason),
    BreakpointValidated { path: String, breakpoint: Breakpoint },
    Output {
        category: OutputCategory,
        text: String,
        path: Option<String>,
        line: usize,
        column: usize,
    },
    End,
}
