//! Session loop: read requests, dispatch them, and keep responses and events ordered on the wire.

use condor_debugger::{Interpreter, InterpreterConfig, PdbLauncher};
use condor_generation::{GenerationClient, GenerationConfig};
use condor_protocol::{Event, ProtocolMessage, Request};
use condor_runtime::{
    LocalFileAccessor, Runtime, RuntimeEvent, RuntimeServices, RuntimeSettings,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;

use crate::adapter::{Adapter, Outcome};
use crate::config::AdapterConfig;
use crate::transport::{FrameReader, FrameWriter};

const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Services backed by the local file system, the configured model and the external interpreter.
pub fn local_services(generation: GenerationConfig, interpreter: InterpreterConfig) -> RuntimeServices {
    RuntimeServices {
        storage: Arc::new(LocalFileAccessor),
        generation: Arc::new(GenerationClient::new(generation)),
        launcher: Arc::new(PdbLauncher::new(interpreter.clone())),
        interpreter: Interpreter::new(interpreter),
    }
}

async fn write_outcome(writer: &FrameWriter, outcome: Outcome) -> io::Result<()> {
    writer.send(ProtocolMessage::Response(outcome.response)).await?;
    for event in outcome.events {
        writer.send(ProtocolMessage::Event(event)).await?;
    }
    Ok(())
}

/// Write runtime and adapter events as they arrive.
///
/// Every batch is written under `gate`, so events raised while a request is being handled land
/// after that request's response.
async fn pump_events(
    adapter: Arc<Adapter>,
    writer: FrameWriter,
    gate: Arc<Mutex<()>>,
    mut runtime_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    mut adapter_rx: mpsc::UnboundedReceiver<Event>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let batch = tokio::select! {
            Some(first) = runtime_rx.recv() => {
                let _turn = gate.lock().await;
                let mut events = vec![first];
                while let Ok(next) = runtime_rx.try_recv() {
                    events.push(next);
                }
                let mut batch = Vec::with_capacity(events.len());
                for event in events {
                    batch.push(adapter.runtime_event(event).await);
                }
                if write_events(&writer, batch).await.is_err() {
                    return;
                }
                continue;
            }
            Some(event) = adapter_rx.recv() => vec![event],
            _ = &mut stop => break,
        };
        let _turn = gate.lock().await;
        if write_events(&writer, batch).await.is_err() {
            return;
        }
    }

    // flush whatever the teardown raised
    let mut rest = Vec::new();
    while let Ok(event) = runtime_rx.try_recv() {
        rest.push(adapter.runtime_event(event).await);
    }
    while let Ok(event) = adapter_rx.try_recv() {
        rest.push(event);
    }
    let _ = write_events(&writer, rest).await;
}

async fn write_events(writer: &FrameWriter, events: Vec<Event>) -> io::Result<()> {
    for event in events {
        log::debug!("-> event {}", event.event);
        writer.send(ProtocolMessage::Event(event)).await?;
    }
    Ok(())
}

/// Serve one debug session over `read`/`write` until `disconnect` or end of input.
pub async fn serve<R, W>(
    read: R,
    write: W,
    services: RuntimeServices,
    config: AdapterConfig,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (runtime_tx, runtime_rx) = mpsc::unbounded_channel();
    let (adapter_tx, adapter_rx) = mpsc::unbounded_channel();
    let settings = RuntimeSettings {
        storage_dir: config.resolved_storage_dir(),
    };
    log::info!("Generated programs go to {}", settings.storage_dir.display());
    let runtime = Runtime::new(services, settings, runtime_tx);
    let adapter = Arc::new(Adapter::new(runtime, config, adapter_tx));

    let (writer, write_task) = FrameWriter::spawn(write);
    let gate = Arc::new(Mutex::new(()));
    let (stop_tx, stop_rx) = oneshot::channel();
    let pump = tokio::spawn(pump_events(
        Arc::clone(&adapter),
        writer.clone(),
        Arc::clone(&gate),
        runtime_rx,
        adapter_rx,
        stop_rx,
    ));

    let mut launches: JoinSet<()> = JoinSet::new();
    let mut reader = FrameReader::new(read);
    let result = loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("Client closed the stream");
                break Ok(());
            }
            Err(e) => {
                log::error!("Transport error: {e}");
                break Err(anyhow::Error::from(e));
            }
        };

        let request: Request = match serde_json::from_slice::<ProtocolMessage>(&frame) {
            Ok(ProtocolMessage::Request(request)) => request,
            Ok(other) => {
                log::debug!("Ignoring non-request message (seq {})", other.seq());
                continue;
            }
            Err(e) => {
                log::warn!("Skipping malformed message: {e}");
                continue;
            }
        };
        log::debug!("<- {} (seq {})", request.command, request.seq);

        if matches!(request.command.as_str(), "launch" | "attach") {
            let adapter = Arc::clone(&adapter);
            let writer = writer.clone();
            let gate = Arc::clone(&gate);
            launches.spawn(async move {
                adapter.wait_for_configuration().await;
                let _turn = gate.lock().await;
                let outcome = adapter.launch(&request).await;
                if let Err(e) = write_outcome(&writer, outcome).await {
                    log::error!("Failed to write launch response: {e}");
                }
            });
            continue;
        }

        let _turn = gate.lock().await;
        let outcome = adapter.handle(&request).await;
        let shutdown = outcome.shutdown;
        if let Err(e) = write_outcome(&writer, outcome).await {
            log::error!("Failed to write response: {e}");
            break Err(anyhow::Error::from(e));
        }
        if shutdown {
            log::info!("Session disconnected");
            break Ok(());
        }
    };

    launches.abort_all();
    while launches.join_next().await.is_some() {}
    adapter.shutdown().await;

    let _ = stop_tx.send(());
    let mut pump = pump;
    if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await.is_err() {
        log::warn!("Event pump did not finish within {PUMP_DRAIN_TIMEOUT:?}");
        pump.abort();
    }
    drop(writer);
    // progress tasks may still hold the adapter, but never a writer
    let _ = write_task.await;
    result
}
