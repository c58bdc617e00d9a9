//! `python -m pdb` driver.
//!
//! The generated code is written to a temporary script followed by a `pdb.set_trace()` trailer
//! and started with `-c continue`, so the first prompt the driver sees is the one after all of
//! the code ran. From there the session only answers variable probes and assignments.
//!
//! Probes are not sent before that first prompt. Every probe carries an id that pdb echoes back
//! inside the answer; an answer whose id is not the pending one (a probe that already timed out)
//! is dropped.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::Write as _;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::chrome;
use crate::config::InterpreterConfig;
use crate::error::{DebuggerError, Result};
use crate::literal::{tagged_answer, try_parse_literal};
use crate::target::{
    DebugLauncher, DebugTarget, OutputStream, ProbeScope, TargetEvent, TargetEvents,
};

/// Appended to every generated script so execution parks in the debugger at the end.
pub const BREAK_TRAILER: &str = "\nimport pdb; pdb.set_trace()\n";

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type PendingProbe = Arc<Mutex<Option<(u64, oneshot::Sender<String>)>>>;

/// Where the debugger is, as seen from its stdout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Readiness {
    /// The program is still running towards the break.
    Starting,
    /// pdb has shown its prompt at least once.
    AtPrompt,
    /// stdout closed.
    Closed,
}

/// Launches generated code under pdb.
#[derive(Debug, Clone)]
pub struct PdbLauncher {
    config: InterpreterConfig,
}

impl PdbLauncher {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DebugLauncher for PdbLauncher {
    async fn launch(&self, code: &str, events: TargetEvents) -> Result<Arc<dyn DebugTarget>> {
        let session = PdbSession::spawn(&self.config, code, events).await?;
        Ok(Arc::new(session))
    }
}

/// One running pdb process (or anything speaking its line protocol).
pub struct PdbSession {
    stdin: Mutex<Option<BoxedWriter>>,
    // tokio's mutex is fair, so waiting probes are served first-come first-served
    probe_turn: Mutex<()>,
    pending: PendingProbe,
    next_probe: AtomicU64,
    readiness: watch::Receiver<Readiness>,
    child: Mutex<Option<Child>>,
    readers: Vec<JoinHandle<()>>,
    probe_timeout: Duration,
    shutdown_grace: Duration,
    _script: Option<NamedTempFile>,
}

impl PdbSession {
    /// Write `code` plus the break trailer to a temporary script, start pdb on it and wait for
    /// the program to reach the break.
    pub async fn spawn(config: &InterpreterConfig, code: &str, events: TargetEvents) -> Result<Self> {
        let mut script = tempfile::Builder::new()
            .prefix("condor-")
            .suffix(".py")
            .tempfile()?;
        script.write_all(code.as_bytes())?;
        script.write_all(BREAK_TRAILER.as_bytes())?;
        script.flush()?;

        let mut cmd = Command::new(&config.program);
        cmd.arg("-m")
            .arg("pdb")
            .arg("-c")
            .arg("continue")
            .arg(script.path())
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| DebuggerError::Spawn {
            program: config.program.clone(),
            source,
        })?;
        log::info!(
            "Started pdb (pid {:?}) on {}",
            child.id(),
            script.path().display()
        );

        let stdin = child.stdin.take().ok_or(DebuggerError::Exited)?;
        let stdout = child.stdout.take().ok_or(DebuggerError::Exited)?;
        let stderr = child.stderr.take().map(|s| Box::new(s) as BoxedReader);

        let mut session = Self::from_streams(Box::new(stdout), stderr, Box::new(stdin), events, config);
        session.child = Mutex::new(Some(child));
        session._script = Some(script);

        // a program that never reaches the break still yields a session; its probes time out
        match session
            .wait_for_prompt(Instant::now() + config.startup_timeout())
            .await
        {
            Ok(()) => log::debug!("pdb reached the break"),
            Err(DebuggerError::ProbeTimeout(_)) => log::warn!(
                "pdb did not reach the break within {:?}",
                config.startup_timeout()
            ),
            Err(err) => log::warn!("pdb did not reach the break: {err}"),
        }
        Ok(session)
    }

    /// Drive an already running pdb-like process through its streams.
    pub fn from_streams(
        stdout: BoxedReader,
        stderr: Option<BoxedReader>,
        stdin: BoxedWriter,
        events: TargetEvents,
        config: &InterpreterConfig,
    ) -> Self {
        let pending: PendingProbe = Arc::new(Mutex::new(None));
        let (readiness_tx, readiness) = watch::channel(Readiness::Starting);
        let mut readers = vec![tokio::spawn(read_stdout(
            stdout,
            Arc::clone(&pending),
            readiness_tx,
            events.clone(),
        ))];
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(read_stderr(stderr, events)));
        }
        Self {
            stdin: Mutex::new(Some(stdin)),
            probe_turn: Mutex::new(()),
            pending,
            next_probe: AtomicU64::new(1),
            readiness,
            child: Mutex::new(None),
            readers,
            probe_timeout: config.probe_timeout(),
            shutdown_grace: config.shutdown_grace(),
            _script: None,
        }
    }

    /// Resolve once pdb has prompted; fails when stdout closed first or `deadline` passed.
    async fn wait_for_prompt(&self, deadline: Instant) -> Result<()> {
        let mut readiness = self.readiness.clone();
        let state = tokio::time::timeout_at(
            deadline,
            readiness.wait_for(|state| *state != Readiness::Starting),
        )
        .await
        .map_err(|_| DebuggerError::ProbeTimeout(self.probe_timeout))?
        .map(|state| *state);
        match state {
            Ok(Readiness::AtPrompt) => Ok(()),
            _ => Err(DebuggerError::Exited),
        }
    }

    async fn send_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(DebuggerError::Exited)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn probe_raw(&self, scope: ProbeScope) -> Result<String> {
        let _turn = self.probe_turn.lock().await;
        let deadline = Instant::now() + self.probe_timeout;
        self.wait_for_prompt(deadline).await?;

        let id = self.next_probe.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().await = Some((id, tx));
        if let Err(err) = self.send_line(&scope.command(id)).await {
            self.pending.lock().await.take();
            return Err(err);
        }
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(_)) => Err(DebuggerError::Exited),
            Err(_) => {
                self.pending.lock().await.take();
                log::debug!("Probe {id} abandoned after {:?}", self.probe_timeout);
                Err(DebuggerError::ProbeTimeout(self.probe_timeout))
            }
        }
    }
}

#[async_trait]
impl DebugTarget for PdbSession {
    async fn probe(&self, scope: ProbeScope) -> Result<Map<String, Value>> {
        let raw = self.probe_raw(scope).await?;
        log::debug!("Probe {scope:?} answered with {} bytes", raw.len());
        try_parse_literal(&raw)
    }

    async fn assign(&self, name: &str, value: &str) -> Result<()> {
        let _turn = self.probe_turn.lock().await;
        self.wait_for_prompt(Instant::now() + self.probe_timeout)
            .await?;
        self.send_line(&format!("!{name} = {value}")).await
    }

    async fn shutdown(&self) -> Result<()> {
        // ignore write errors: the process may already be gone
        let _ = self.send_line("q").await;
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => log::debug!("pdb exited with {status}"),
                Ok(Err(err)) => log::warn!("Failed to wait on pdb: {err}"),
                Err(_) => {
                    log::debug!("pdb did not quit in {:?}; killing it", self.shutdown_grace);
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for PdbSession {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Read stdout in chunks: complete lines are answers or program output, and an unterminated
/// tail ending in a prompt marks the debugger as ready.
async fn read_stdout(
    mut stdout: BoxedReader,
    pending: PendingProbe,
    readiness: watch::Sender<Readiness>,
    events: TargetEvents,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                log::warn!("Error reading pdb stdout: {err}");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some(end) = buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buf.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            handle_stdout_line(line.trim_end_matches('\r'), &pending, &events).await;
        }

        let tail = String::from_utf8_lossy(&buf).into_owned();
        if let Some(before) = chrome::before_prompt(&tail) {
            if !before.is_empty() {
                forward_output(before, "", &events);
            }
            buf.clear();
            readiness.send_replace(Readiness::AtPrompt);
        }
    }

    if !buf.is_empty() {
        let tail = String::from_utf8_lossy(&buf).into_owned();
        handle_stdout_line(&tail, &pending, &events).await;
    }
    // wake a waiting probe with an error instead of letting it run into the timeout
    pending.lock().await.take();
    readiness.send_replace(Readiness::Closed);
    log::info!("pdb output closed");
    let _ = events.send(TargetEvent::Exited { code: None });
}

async fn handle_stdout_line(line: &str, pending: &PendingProbe, events: &TargetEvents) {
    if let Some((id, body)) = tagged_answer(line) {
        let mut slot = pending.lock().await;
        match slot.take() {
            Some((expected, tx)) if expected == id => {
                let _ = tx.send(body);
            }
            other => {
                *slot = other;
                log::debug!("Dropping answer to abandoned probe {id}");
            }
        }
        return;
    }
    forward_output(line, "\n", events);
}

fn forward_output(line: &str, terminator: &str, events: &TargetEvents) {
    if chrome::is_chrome(line) {
        return;
    }
    let text = chrome::strip_prompts(line);
    if let Some(summary) = chrome::exception_summary(text) {
        let _ = events.send(TargetEvent::Exception {
            summary: summary.to_string(),
        });
    }
    let _ = events.send(TargetEvent::Output {
        stream: OutputStream::Stdout,
        text: format!("{text}{terminator}"),
    });
}

async fn read_stderr(stderr: BoxedReader, events: TargetEvents) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(summary) = chrome::exception_summary(&line) {
            let _ = events.send(TargetEvent::Exception {
                summary: summary.to_string(),
            });
        }
        let _ = events.send(TargetEvent::Output {
            stream: OutputStream::Stderr,
            text: format!("{line}\n"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::mpsc;

    const BANNER: &str = "> /tmp/condor-x.py(3)<module>()\n-> import pdb; pdb.set_trace()\n(Pdb) ";

    fn probe_id(cmd: &str) -> u64 {
        let marker = "'__condor_probe__': ";
        let start = cmd.find(marker).expect("tagged probe") + marker.len();
        cmd[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .expect("probe id")
    }

    fn answer(cmd: &str, fields: &str) -> String {
        format!("\"{{'__condor_probe__': {}, {fields}}}\"\n", probe_id(cmd))
    }

    /// Stand-in for pdb: prints `preamble` as program output, prompts, then answers probe
    /// commands by scope and echoes anything else.
    async fn fake_pdb(io: DuplexStream, preamble: &'static str) {
        let (read, mut write) = tokio::io::split(io);
        let mut lines = BufReader::new(read).lines();
        write.write_all(preamble.as_bytes()).await.expect("preamble");
        write.write_all(BANNER.as_bytes()).await.expect("banner");
        while let Ok(Some(cmd)) = lines.next_line().await {
            let reply = if cmd.contains("dict(locals())") {
                // a stray program line before the answer must not be taken for it
                format!("running\n{}", answer(&cmd, "'a': 1, 'f': '<function f at 0x1>'"))
            } else if cmd.contains("dict(globals())") {
                answer(&cmd, "'g': 'two', 'flag': True")
            } else if cmd == "q" {
                break;
            } else {
                format!("echo {cmd}\n")
            };
            write.write_all(reply.as_bytes()).await.expect("reply");
            write.write_all(b"(Pdb) ").await.expect("prompt");
        }
    }

    fn session_with(events: TargetEvents, preamble: &'static str) -> PdbSession {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_pdb(theirs, preamble));
        let (read, write) = tokio::io::split(ours);
        PdbSession::from_streams(
            Box::new(read),
            None,
            Box::new(write),
            events,
            &InterpreterConfig::default(),
        )
    }

    fn session(events: TargetEvents) -> PdbSession {
        session_with(events, "")
    }

    #[tokio::test]
    async fn probe_parses_scope_and_forwards_program_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let target = session(tx);
        let locals = target.probe(ProbeScope::Locals).await.expect("probe");
        assert_eq!(
            Value::Object(locals),
            json!({ "a": 1, "f": "<function f at 0x1>" })
        );

        let first = rx.recv().await.expect("event");
        assert_eq!(
            first,
            TargetEvent::Output {
                stream: OutputStream::Stdout,
                text: "running\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn concurrent_probes_are_serialized() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let target = session(tx);
        let (locals, globals) = tokio::join!(
            target.probe(ProbeScope::Locals),
            target.probe(ProbeScope::Globals)
        );
        let locals = locals.expect("locals");
        let globals = globals.expect("globals");
        assert!(locals.contains_key("a"));
        assert!(!locals.contains_key("g"));
        assert_eq!(Value::Object(globals), json!({ "g": "two", "flag": true }));
    }

    #[tokio::test]
    async fn program_lines_shaped_like_answers_stay_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let target = session_with(tx, "'{x'\n\"{'a': 1}\"\n");
        let locals = target.probe(ProbeScope::Locals).await.expect("probe");
        assert_eq!(
            Value::Object(locals),
            json!({ "a": 1, "f": "<function f at 0x1>" })
        );

        let mut printed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TargetEvent::Output { text, .. } = event {
                printed.push(text);
            }
        }
        assert_eq!(printed, vec!["'{x'\n", "\"{'a': 1}\"\n", "running\n"]);
    }

    #[tokio::test]
    async fn probe_times_out_when_nothing_answers() {
        let (ours, _theirs) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(ours);
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = InterpreterConfig {
            probe_timeout_ms: 50,
            ..InterpreterConfig::default()
        };
        let target = PdbSession::from_streams(Box::new(read), None, Box::new(write), tx, &config);
        let err = target.probe(ProbeScope::Locals).await.expect_err("timeout");
        assert!(matches!(err, DebuggerError::ProbeTimeout(_)));
    }

    #[tokio::test]
    async fn late_answer_after_a_timeout_is_dropped() {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        // answers locals only after the probe gave up, globals at once
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read).lines();
            write.write_all(BANNER.as_bytes()).await.expect("banner");
            while let Ok(Some(cmd)) = lines.next_line().await {
                let reply = if cmd.contains("dict(locals())") {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    answer(&cmd, "'scope': 'locals'")
                } else {
                    answer(&cmd, "'scope': 'globals'")
                };
                write.write_all(reply.as_bytes()).await.expect("reply");
                write.write_all(b"(Pdb) ").await.expect("prompt");
            }
        });
        let (read, write) = tokio::io::split(ours);
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = InterpreterConfig {
            probe_timeout_ms: 200,
            ..InterpreterConfig::default()
        };
        let target = PdbSession::from_streams(Box::new(read), None, Box::new(write), tx, &config);

        let first = target.probe(ProbeScope::Locals).await;
        assert!(matches!(first, Err(DebuggerError::ProbeTimeout(_))));
        let second = target.probe(ProbeScope::Globals).await.expect("globals");
        assert_eq!(Value::Object(second), json!({ "scope": "globals" }));
    }

    #[tokio::test]
    async fn scope_queries_wait_for_the_first_prompt() {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        let (read, write) = tokio::io::split(ours);
        let (tx, _rx) = mpsc::unbounded_channel();
        let target = PdbSession::from_streams(
            Box::new(read),
            None,
            Box::new(write),
            tx,
            &InterpreterConfig::default(),
        );

        let (their_read, mut their_write) = tokio::io::split(theirs);
        let mut commands = BufReader::new(their_read).lines();
        let pdb = async {
            let early =
                tokio::time::timeout(Duration::from_millis(100), commands.next_line()).await;
            assert!(early.is_err(), "command sent while the program was still running");
            their_write.write_all(b"x = 1\n(Pdb) ").await.expect("prompt");
            let cmd = commands.next_line().await.expect("read").expect("command");
            their_write
                .write_all(answer(&cmd, "'x': 1").as_bytes())
                .await
                .expect("answer");
        };
        let (locals, ()) = tokio::join!(target.probe(ProbeScope::Locals), pdb);
        assert_eq!(Value::Object(locals.expect("locals")), json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn probe_fails_fast_when_process_is_gone() {
        let (ours, theirs) = tokio::io::duplex(1024);
        drop(theirs);
        let (read, write) = tokio::io::split(ours);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let target = PdbSession::from_streams(
            Box::new(read),
            None,
            Box::new(write),
            tx,
            &InterpreterConfig::default(),
        );
        assert_eq!(rx.recv().await, Some(TargetEvent::Exited { code: None }));
        assert!(matches!(
            target.probe(ProbeScope::Globals).await,
            Err(DebuggerError::Exited)
        ));
    }

    #[tokio::test]
    async fn stderr_lines_surface_exceptions() {
        let (out_ours, _out_theirs) = tokio::io::duplex(1024);
        let (err_ours, mut err_theirs) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(out_ours);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _target = PdbSession::from_streams(
            Box::new(read),
            Some(Box::new(err_ours)),
            Box::new(write),
            tx,
            &InterpreterConfig::default(),
        );
        err_theirs
            .write_all(b"NameError: name 'y' is not defined\n")
            .await
            .expect("write");
        assert_eq!(
            rx.recv().await,
            Some(TargetEvent::Exception {
                summary: "NameError: name 'y' is not defined".to_string()
            })
        );
        assert!(matches!(
            rx.recv().await,
            Some(TargetEvent::Output { stream: OutputStream::Stderr, .. })
        ));
    }
}
