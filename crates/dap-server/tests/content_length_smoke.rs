use anyhow::{Context, Result};
use condor_dap::transport::{encode_frame, FrameReader};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout, Command};

fn locate_condor_dap_bin() -> Result<PathBuf> {
    if let Some(path) = option_env!("CARGO_BIN_EXE_condor-dap") {
        return Ok(PathBuf::from(path));
    }

    // `.../target/{debug|release}/deps/<test>` → `.../target/{debug|release}/condor-dap`
    if let Ok(exe) = std::env::current_exe() {
        if let Some(target_profile_dir) = exe.parent().and_then(|p| p.parent()) {
            let candidate = target_profile_dir.join("condor-dap");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    anyhow::bail!("failed to locate condor-dap binary")
}

async fn send_frame(stdin: &mut ChildStdin, value: &Value) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    stdin.write_all(&encode_frame(&json)).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_message(reader: &mut FrameReader<ChildStdout>) -> Result<Value> {
    let frame = tokio::time::timeout(Duration::from_secs(10), reader.read_frame())
        .await
        .context("timeout waiting for a frame")??
        .context("adapter closed stdout")?;
    Ok(serde_json::from_slice(&frame)?)
}

#[tokio::test]
async fn adapter_answers_content_length_frames_over_stdio() -> Result<()> {
    let bin = locate_condor_dap_bin()?;
    let storage = tempfile::tempdir()?;

    let mut child = Command::new(bin)
        .env("CONDOR_GENERATION_MODE", "echo")
        .env("CONDOR_STORAGE_DIR", storage.path())
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("spawn condor-dap")?;
    let mut stdin = child.stdin.take().context("child stdin")?;
    let mut reader = FrameReader::new(child.stdout.take().context("child stdout")?);

    send_frame(
        &mut stdin,
        &json!({
            "seq": 1,
            "type": "request",
            "command": "initialize",
            "arguments": { "clientID": "smoke", "adapterID": "condor" }
        }),
    )
    .await?;

    let response = read_message(&mut reader).await?;
    assert_eq!(response["type"], json!("response"));
    assert_eq!(response["request_seq"], json!(1));
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["body"]["supportsConfigurationDoneRequest"], json!(true));

    let initialized = read_message(&mut reader).await?;
    assert_eq!(initialized["event"], json!("initialized"));
    assert!(initialized["seq"].as_i64() > response["seq"].as_i64());

    send_frame(
        &mut stdin,
        &json!({ "seq": 2, "type": "request", "command": "disconnect", "arguments": {} }),
    )
    .await?;
    let response = read_message(&mut reader).await?;
    assert_eq!(response["command"], json!("disconnect"));

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .context("adapter did not exit after disconnect")??;
    assert!(status.success());
    Ok(())
}
