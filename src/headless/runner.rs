//! Headless runner - NDJSON event loop around the engine
//!
//! One task writes everything the core sends (replies, events, requests) to the output.
//! The read loop parses input lines and hands them to the engine; it never waits on a
//! component, so replies to `verifyPin` can arrive while a verification is pending.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use butler_app::{handle_call, Engine, Settings};
use butler_core::prelude::{Result, ResultExt};
use butler_platform::{
    parse_inbound, ChannelBridge, FilePreferences, InboundMessage, MemoryPreferences,
    OutboundMessage, PreferenceStore, SimulatedDevice,
};

use super::apply_simulation;

/// How often abandoned requests are swept from the tracker
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Startup options for headless mode
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub settings: Settings,
    /// File-backed preference store; in-memory when `None`
    pub prefs_path: Option<PathBuf>,
    pub max_volume: u32,
}

/// Run against stdin/stdout until stdin closes
pub async fn run_headless(options: HeadlessOptions) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("Flutter Butler starting in HEADLESS mode");
    match &options.prefs_path {
        Some(path) => info!("Preferences: {}", path.display()),
        None => info!("Preferences: in-memory"),
    }
    info!("═══════════════════════════════════════════════════════");

    let prefs: Arc<dyn PreferenceStore> = match &options.prefs_path {
        Some(path) => Arc::new(
            FilePreferences::open(path.clone())
                .with_context(|| format!("Opening preference store {}", path.display()))?,
        ),
        None => Arc::new(MemoryPreferences::new()),
    };
    let device = SimulatedDevice::with_prefs(options.max_volume, prefs);

    let result = serve(
        options.settings,
        device,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    info!("Flutter Butler headless mode exiting");
    result
}

/// Drive an engine over arbitrary line-oriented I/O
///
/// Returns once `input` reaches EOF and the engine has been torn down.
pub async fn serve<R, W>(
    settings: Settings,
    device: Arc<SimulatedDevice>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (bridge, outbound_rx) = ChannelBridge::channel(settings.timing.pin_verify_timeout());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let writer = tokio::spawn(write_outbound(outbound_rx, output, shutdown_rx));

    let engine = match Engine::with_bridge(settings, device.services(), bridge) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Engine failed to start: {}", e);
            let _ = shutdown_tx.send(true);
            let _ = writer.await;
            return Err(e);
        }
    };

    let result = read_loop(&engine, &device, input).await;

    engine.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = writer.await {
        error!("Outbound writer task failed: {}", e);
    }
    result
}

async fn read_loop<R>(engine: &Engine, device: &SimulatedDevice, mut input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let request_timeout = engine.settings.timing.pin_verify_timeout();
    let mut sweep = tokio::time::interval(STALE_SWEEP_INTERVAL);

    loop {
        tokio::select! {
            read = input.read_until(b'\n', &mut buf) => {
                if read? == 0 {
                    info!("Input closed");
                    break;
                }
                // Undecodable bytes become U+FFFD and the line fails to parse like any other
                let line = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();
                handle_line(engine, device, &line).await;
            }
            _ = sweep.tick() => {
                let stale = engine.bridge().tracker().cleanup_stale(request_timeout).await;
                if !stale.is_empty() {
                    warn!("Dropped {} stale request(s): {:?}", stale.len(), stale);
                }
            }
        }
    }
    Ok(())
}

async fn handle_line(engine: &Engine, device: &SimulatedDevice, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    trace!("<- {}", line);

    match parse_inbound(line) {
        Ok(InboundMessage::Call { id, call }) => handle_call(engine, id, &call),
        Ok(InboundMessage::Response { id, result, error }) => {
            engine.bridge().handle_response(id, result, error).await;
        }
        Ok(InboundMessage::Signal(signal)) => {
            engine.dispatch_signal(signal);
        }
        Ok(InboundMessage::Simulate(action)) => apply_simulation(device, action),
        Err(e) => warn!("Ignoring input line: {}", e),
    }
}

/// Write outbound messages until shutdown, then flush whatever is still queued
async fn write_outbound<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut output: W,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write_message(&mut output, &msg).await {
                        error!("Output closed: {}", e);
                        return;
                    }
                }
                None => break,
            },
            _ = shutdown_rx.changed() => {
                while let Ok(msg) = rx.try_recv() {
                    if write_message(&mut output, &msg).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    debug!("Outbound writer exiting");
}

async fn write_message<W>(output: &mut W, msg: &OutboundMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = msg.to_line()?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    trace!("-> {}", msg.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_platform::DEFAULT_MAX_VOLUME;

    #[tokio::test]
    async fn test_unopenable_prefs_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, "x").unwrap();

        let err = run_headless(HeadlessOptions {
            settings: Settings::default(),
            prefs_path: Some(not_a_dir.join("prefs.json")),
            max_volume: DEFAULT_MAX_VOLUME,
        })
        .await
        .unwrap_err();

        assert!(err.is_fatal());
    }
}
