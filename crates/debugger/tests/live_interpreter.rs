//! Exercises the drivers against a real interpreter. Skipped when none is installed.

use anyhow::Result;
use condor_debugger::{
    DebugLauncher, Interpreter, InterpreterConfig, OutputStream, PdbLauncher, ProbeScope,
    TargetEvent, VariableView,
};
use std::time::Duration;
use tokio::sync::mpsc;

async fn python_available(config: &InterpreterConfig) -> bool {
    match Interpreter::new(config.clone()).run_inline("print(1)").await {
        Ok(out) => out.stdout.trim() == "1",
        Err(_) => false,
    }
}

#[tokio::test]
async fn pdb_session_reports_variables_and_output() -> Result<()> {
    let config = InterpreterConfig::default().merge_env();
    if !python_available(&config).await {
        eprintln!("skipping: {} not available", config.program);
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let launcher = PdbLauncher::new(config);
    let code = "x = 41\ny = x + 1\nprint('ready')\ndef double(v):\n    return v * 2\n";
    let target = launcher.launch(code, tx).await?;

    let locals = target.probe(ProbeScope::Locals).await?;
    assert_eq!(locals.get("x"), Some(&serde_json::json!(41)));
    assert_eq!(locals.get("y"), Some(&serde_json::json!(42)));
    assert!(!locals.contains_key("pdb"));
    assert!(locals.keys().all(|k| !k.starts_with("__")));

    let methods = VariableView::Methods.filter(locals.clone());
    assert!(methods.contains_key("double"));
    let variables = VariableView::Variables.filter(locals);
    assert!(!variables.contains_key("double"));

    let mut saw_ready = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        if let TargetEvent::Output {
            stream: OutputStream::Stdout,
            text,
        } = event
        {
            assert!(!text.contains("(Pdb)"));
            saw_ready |= text.trim() == "ready";
        }
    }
    assert!(saw_ready);

    target.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn one_shot_run_separates_stdout_and_stderr() -> Result<()> {
    let config = InterpreterConfig::default().merge_env();
    if !python_available(&config).await {
        eprintln!("skipping: {} not available", config.program);
        return Ok(());
    }
    let interpreter = Interpreter::new(config);

    let dir = tempfile::tempdir()?;
    let script = dir.path().join("ok.py");
    std::fs::write(&script, "print(6 * 7)\n")?;
    assert_eq!(interpreter.run_file(&script).await?.into_result()?, "42\n");

    let failing = interpreter.run_inline("1 / 0").await?;
    assert!(failing.is_error());
    assert!(failing.stderr.contains("ZeroDivisionError"));
    Ok(())
}
