//! Newline-delimited JSON bridge between a host process and the engine.
//!
//! Reads [`CommandEnvelope`] lines, applies them to an in-process
//! [`MemoryItemStore`] watched by a [`ReminderEngine`], and writes
//! [`ResponseEnvelope`] and [`EventEnvelope`] lines back.
//!
//! The output stream is reserved for the protocol; diagnostics go through
//! `tracing` and must be routed elsewhere by the binary.

use crate::config::EngineConfig;
use crate::engine::ReminderEngine;
use crate::host::contract::{CommandEnvelope, EventEnvelope, HostCommand, ResponseEnvelope};
use crate::host::surface::HostSurface;
use crate::item::{ReminderItem, ScheduleKey};
use crate::notify::fallback::FallbackNotice;
use crate::store::MemoryItemStore;
use chrono::TimeDelta;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Event emitted once the engine is initialized.
pub const READY_EVENT: &str = "ready";
/// Event carrying a fallback notice.
pub const FALLBACK_EVENT: &str = "fallback";
/// Event emitted after the engine has shut down.
pub const STOPPED_EVENT: &str = "stopped";
/// Title of tasks created by a scheduled `test` command.
pub const TEST_TASK_TITLE: &str = "Test Reminder";

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge over the process's stdin and stdout until stdin closes or
/// a `shutdown` command arrives.
pub async fn run_stdio_bridge(config: EngineConfig) -> crate::Result<()> {
    run_bridge(
        config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge over arbitrary streams.
///
/// # Errors
///
/// Returns an error for an invalid configuration, a failed engine start, or
/// an unreadable input / unwritable output stream.
pub async fn run_bridge<R, W>(config: EngineConfig, input: R, output: W) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EventEnvelope>();

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    let mut w = event_writer.lock().await;
                    if let Err(e) = write_line(&mut w, &json).await {
                        warn!(error = %e, "failed to write event; stopping event forwarder");
                        break;
                    }
                }
                Err(e) => error!(error = %e, "failed to serialize event; skipping"),
            }
        }
    });

    let store = Arc::new(MemoryItemStore::new());
    let surface = Arc::new(HostSurface::new(
        config.surface.primary_enabled,
        event_tx.clone(),
    ));
    let engine = ReminderEngine::new(config, store.clone(), surface)?;
    let mut fallback_rx = engine.fallback().subscribe();

    let status = engine.initialize().await?;
    emit(&event_tx, READY_EVENT, &status);

    let result = run_reader(&engine, &store, input, &writer, &mut fallback_rx, &event_tx).await;

    engine.shutdown().await;
    drain_fallback(&mut fallback_rx, &event_tx);
    emit(&event_tx, STOPPED_EVENT, &json!({}));

    drop(engine);
    drop(event_tx);
    if let Err(e) = event_handle.await {
        warn!("event forwarder ended abnormally: {e}");
    }

    result
}

async fn run_reader<R, W>(
    engine: &ReminderEngine,
    store: &MemoryItemStore,
    input: R,
    writer: &SharedWriter<W>,
    fallback_rx: &mut broadcast::Receiver<FallbackNotice>,
    event_tx: &mpsc::UnboundedSender<EventEnvelope>,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            biased;
            notice = fallback_rx.recv() => {
                match notice {
                    Ok(notice) => emit(event_tx, FALLBACK_EVENT, &notice),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "fallback forwarder lagged; notices were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                }
                continue;
            }
            line = lines.next_line() => line.map_err(|e| {
                crate::ReminderError::Channel(format!("failed to read command line: {e}"))
            })?,
        };

        let Some(line) = line else {
            info!("input closed; shutting down bridge");
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<CommandEnvelope>(trimmed)
            .map_err(|e| crate::ReminderError::Channel(format!("failed to parse command: {e}")))
            .and_then(|envelope| envelope.validate().map(|()| envelope))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(raw_line = %trimmed, "{e}");
                let response = ResponseEnvelope::error(None, "parse", e.to_string());
                respond(writer, &response).await?;
                continue;
            }
        };

        let name = envelope.command.as_str();
        let is_shutdown = envelope.command == HostCommand::Shutdown;
        let response = match handle(engine, store, envelope.command).await {
            Ok(payload) => ResponseEnvelope::ok(envelope.request_id, name, payload),
            Err(e) => {
                warn!(command = name, "command failed: {e}");
                ResponseEnvelope::error(envelope.request_id, name, e.to_string())
            }
        };
        respond(writer, &response).await?;

        if is_shutdown {
            info!("shutdown received; stopping bridge");
            break;
        }
    }

    Ok(())
}

async fn handle(
    engine: &ReminderEngine,
    store: &MemoryItemStore,
    command: HostCommand,
) -> crate::Result<serde_json::Value> {
    match command {
        HostCommand::Upsert { item } => {
            let item = ReminderItem::from_record(item);
            let key = item.key();
            let change = store.upsert(item);
            engine.flush().await?;
            Ok(json!({
                "key": key.to_string(),
                "change": change,
                "armed": engine.registry().armed_tiers(&key),
            }))
        }
        HostCommand::Complete { kind, id } => {
            let key = ScheduleKey::new(kind, id);
            if !store.set_completed(kind, &key.id, true) {
                return Err(crate::ReminderError::Store(format!("unknown item {key}")));
            }
            engine.flush().await?;
            Ok(json!({ "key": key.to_string() }))
        }
        HostCommand::Remove { kind, id } => {
            let key = ScheduleKey::new(kind, id);
            store
                .remove(&key)
                .ok_or_else(|| crate::ReminderError::Store(format!("unknown item {key}")))?;
            engine.flush().await?;
            Ok(json!({ "key": key.to_string() }))
        }
        HostCommand::Resume => {
            let queued = engine.resume_handle().signal();
            Ok(json!({ "queued": queued }))
        }
        HostCommand::Test { schedule_in_secs } => {
            let route = engine.dispatcher().dispatch_test().await;
            let scheduled = match schedule_in_secs {
                Some(secs) => Some(schedule_test_task(engine, store, secs).await?),
                None => None,
            };
            Ok(json!({ "route": route, "scheduled": scheduled }))
        }
        HostCommand::Shutdown => Ok(serde_json::Value::Null),
    }
}

/// Put a throwaway task due `secs` from now into the store, so the test
/// reminder travels the feed, the registry and the timers like any other.
async fn schedule_test_task(
    engine: &ReminderEngine,
    store: &MemoryItemStore,
    secs: u64,
) -> crate::Result<serde_json::Value> {
    let lead = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| crate::ReminderError::Channel(format!("invalid test lead {secs}s")))?;
    let due = engine.now() + lead;
    let item = ReminderItem::task(
        format!("test-{}", due.timestamp_millis()),
        TEST_TASK_TITLE,
        due,
    );
    let key = item.key();
    store.upsert(item);
    engine.flush().await?;
    info!(key = %key, lead_secs = secs, "test reminder scheduled");
    Ok(json!({
        "key": key.to_string(),
        "due": due,
        "armed": engine.registry().armed_tiers(&key),
    }))
}

fn drain_fallback(
    fallback_rx: &mut broadcast::Receiver<FallbackNotice>,
    event_tx: &mpsc::UnboundedSender<EventEnvelope>,
) {
    loop {
        match fallback_rx.try_recv() {
            Ok(notice) => emit(event_tx, FALLBACK_EVENT, &notice),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!(lagged = n, "fallback notices dropped during shutdown");
            }
            Err(_) => break,
        }
    }
}

fn emit<T: serde::Serialize>(
    event_tx: &mpsc::UnboundedSender<EventEnvelope>,
    event: &str,
    payload: &T,
) {
    match serde_json::to_value(payload) {
        Ok(payload) => {
            if event_tx.send(EventEnvelope::new(event, payload)).is_err() {
                debug!(event, "event forwarder gone; dropping event");
            }
        }
        Err(e) => error!(event, error = %e, "failed to serialize event payload"),
    }
}

async fn respond<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> crate::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| crate::ReminderError::Channel(format!("failed to serialize response: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut BufWriter<W>,
    json: &str,
) -> crate::Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| crate::ReminderError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| crate::ReminderError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| crate::ReminderError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
