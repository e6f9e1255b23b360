//! trigdeck-player - Main entry point
//!
//! Runs the control core against simulated hardware: pins are driven from
//! the stdin console (`pin <n> <0|1>`), clips are "played" by simulated
//! sources that honour volume ramps and clip length, and host commands are
//! typed as console lines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trigdeck_common::config::{load_config, DeviceConfig};
use trigdeck_common::time::{ms_to_ticks, tick_period};
use trigdeck_player::console::{self, ConsoleHandle, ConsoleTransport};
use trigdeck_player::hal::sim::{
    LogIndicator, SimAudioSource, SimCatalog, SimMixer, SimPins, SimTiming,
};
use trigdeck_player::hal::{MonotonicClock, SharedClock};
use trigdeck_player::playback::EnginePool;
use trigdeck_player::trigger::{InputSettings, TriggerInput};
use trigdeck_player::Controller;

/// Command-line arguments for trigdeck-player
#[derive(Parser, Debug)]
#[command(name = "trigdeck-player")]
#[command(about = "Trigger-driven multi-channel audio clip player")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "TRIGDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Poll period in milliseconds (overrides tick_ms)
    #[arg(long, env = "TRIGDECK_TICK_MS")]
    tick_ms: Option<u64>,

    /// Log filter (overrides [logging] level and RUST_LOG)
    #[arg(long, env = "TRIGDECK_LOG")]
    log_level: Option<String>,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

type SimController = Controller<SimAudioSource, ConsoleTransport, SimMixer>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(tick_ms) = args.tick_ms {
        config.tick_ms = tick_ms;
    }

    // Initialize tracing
    let filter = match &args.log_level {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "trigdeck_player={0},trigdeck_common={0}",
                config.logging.level
            )
            .into()
        }),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting trigdeck-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "{} channels, {:?} pool, {} inputs, tick {} ms",
        config.channels,
        config.pool_mode,
        config.inputs.len(),
        config.tick_ms
    );

    let clock: SharedClock = Arc::new(MonotonicClock::new(config.tick_ms));
    let pins = Arc::new(SimPins::new(clock.clone()));
    let (transport, console_handle) = ConsoleTransport::channel();
    let console_output = transport.output();

    let mut controller =
        build_controller(&config, clock, transport).context("Failed to build controller")?;
    controller.enable_inputs(pins.as_ref());

    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    if !args.no_console {
        let ConsoleHandle {
            requests,
            mut replies,
        } = console_handle;

        let console_pins = pins.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) =
                console::read_commands(stdin, requests, console_output, &console_pins).await
            {
                warn!("Console error: {}", e);
            }
            if quit_tx.send(()).is_err() {
                debug!("Main loop already stopped, console quit ignored");
            }
        });

        tokio::spawn(async move {
            while let Some(line) = replies.recv().await {
                println!("{}", line);
            }
        });
        info!("Console ready (type 'help')");
    }

    // Completes only once the console reader has finished
    let console_closed = async move {
        if quit_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    controller
        .run(tick_period(config.tick_ms), async {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = console_closed => {
                    info!("Console closed, shutting down");
                },
            }
        })
        .await;

    controller.shutdown(pins.as_ref());
    match toml::to_string(&controller.snapshot()) {
        Ok(text) => info!("Final state:\n{}", text),
        Err(e) => warn!("Failed to render final state: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Assemble the controller on simulated audio hardware
fn build_controller(
    config: &DeviceConfig,
    clock: SharedClock,
    transport: ConsoleTransport,
) -> Result<SimController> {
    let catalog = Arc::new(match &config.media_root {
        Some(root) => SimCatalog::Directory(root.clone()),
        None => SimCatalog::Any,
    });
    let timing = SimTiming {
        ramp_ticks: ms_to_ticks(config.simulation.ramp_ms, config.tick_ms),
        clip_ticks: ms_to_ticks(config.simulation.clip_ms, config.tick_ms),
    };

    let mut pool = EnginePool::with_factory(config.channels, |_| {
        SimAudioSource::new(clock.clone(), catalog.clone(), timing)
    });
    pool.initialize(config.pool_mode)?;

    if config.media_root.is_some() {
        for input in &config.inputs {
            let path = config.resolve_media_path(&input.file);
            if !path.is_file() {
                warn!("Pin {} clip {} not found", input.pin, path.display());
            }
        }
    }

    let inputs = config
        .inputs
        .iter()
        .map(|input| TriggerInput::new(InputSettings::from_config(input, config.tick_ms)))
        .collect();

    let controller = Controller::new(pool, inputs, transport, SimMixer::default(), clock)?
        .with_indicator(Box::new(LogIndicator::default()));
    Ok(controller)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
