use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use orchestrator::{
    normalize, ControlOrchestrator, OrchestratorOptions, QueueDiscipline, TransitionTable,
};
use shared::{domain::DeviceId, protocol::DeviceEvent};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod console;
mod device;

use console::{run_console, spawn_stdin_reader};
use device::{subscribe_events, EventHandler, HttpDevices, SpawningSink};

#[derive(Parser, Debug)]
struct Args {
    /// Device server base URL; repeat for each device, in device order.
    #[arg(long = "device", required = true)]
    devices: Vec<String>,
    /// TOML transition table; without one no device ever transitions.
    #[arg(long)]
    transitions: Option<PathBuf>,
    #[arg(long, default_value_t = QueueDiscipline::Lifo)]
    queue_discipline: QueueDiscipline,
    #[arg(long, default_value_t = 50)]
    idle_wait_ms: u64,
    #[arg(long, default_value_t = 30_000)]
    request_timeout_ms: u64,
    /// Only print incoming notifications; no control loop.
    #[arg(long)]
    monitor_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let devices = Arc::new(HttpDevices::new(
        &args.devices,
        Duration::from_millis(args.request_timeout_ms),
    )?);

    if args.monitor_only {
        let handler: EventHandler = Arc::new(|device: DeviceId, event: DeviceEvent| {
            println!("[device {device}] {:?}", normalize(&event.message));
        });
        subscribe_all(&devices, handler).await;
        run_console(spawn_stdin_reader(), None).await;
        return Ok(());
    }

    let table = match &args.transitions {
        Some(path) => TransitionTable::load(path)
            .with_context(|| format!("failed to load transitions from {}", path.display()))?,
        None => TransitionTable::default(),
    };
    if table.is_empty() {
        warn!("no transition rules loaded; devices will stay in their initial state");
    }
    let sink = Arc::new(SpawningSink::new(devices.clone(), Handle::current()));
    let orchestrator = ControlOrchestrator::new(
        OrchestratorOptions {
            discipline: args.queue_discipline,
            idle_wait: Duration::from_millis(args.idle_wait_ms),
        },
        table,
        sink,
    );
    for (device, _) in devices.devices() {
        orchestrator.register_device(device);
    }
    let control_loop = orchestrator.spawn();

    let events_target = Arc::clone(&orchestrator);
    let handler: EventHandler = Arc::new(move |device: DeviceId, event: DeviceEvent| {
        events_target.pass_event(device, &event.message);
    });
    subscribe_all(&devices, handler).await;

    let console_target = Arc::clone(&orchestrator);
    let console = tokio::spawn(async move {
        run_console(spawn_stdin_reader(), Some(&console_target)).await;
    });

    control_loop.await.context("control loop task failed")?;
    console.abort();
    info!("control client stopped");
    Ok(())
}

async fn subscribe_all(devices: &HttpDevices, handler: EventHandler) {
    for (device, server_url) in devices.devices() {
        if let Err(err) = subscribe_events(device, server_url, Arc::clone(&handler)).await {
            warn!(%device, %server_url, error = %err, "device events unavailable");
        }
    }
}
