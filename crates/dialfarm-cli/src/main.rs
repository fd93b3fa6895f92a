//! dialfarm CLI and farm runner entry point.

mod args;
mod farm;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dialfarm_core::coords::{CoordinateMap, ScreenSize};
use dialfarm_core::device::{parse_wm_size, DeviceId};
use dialfarm_core::error::ApiError;
use dialfarm_core::grid::fallback_grid;
use dialfarm_core::resolve::ResolveOptions;
use tracing::{error, info, warn};

use crate::args::{CacheAction, Cli, Commands, GridArgs, ResolveArgs, RunArgs, SessionArgs};
use crate::farm::config::{default_screen_size, FarmConfig};
use crate::farm::paths;
use crate::farm::recorder::OutcomeSink;
use crate::farm::transport::{SnapshotProvider, Transport};
use crate::farm::{AdbTransport, CoordinateResolver, CsvRecorder, DiscoveryLoop, SessionDriver};

fn main() {
    // Logs go to stderr so stdout stays clean for JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Dispatch a parsed command. Commands that need no device run without a
/// runtime.
fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Examples => {
            println!("{}", crate::args::EXAMPLES_TEXT);
            Ok(())
        }
        Commands::Grid(args) => print_grid(&args),
        command => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            runtime.block_on(async {
                match command {
                    Commands::Run(args) => run_farm(args).await,
                    Commands::Session(args) => run_single_session(args).await,
                    Commands::Devices => list_devices().await,
                    Commands::Resolve(args) => resolve_device(args).await,
                    Commands::Cache(args) => cache_command(args.action).await,
                    Commands::Examples | Commands::Grid(_) => Ok(()),
                }
            })
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

fn adb() -> Arc<AdbTransport> {
    Arc::new(AdbTransport::new(paths::get_adb_program()))
}

fn coordinate_resolver(options: ResolveOptions) -> anyhow::Result<Arc<CoordinateResolver>> {
    let data_dir = paths::get_data_dir();
    paths::ensure_dir(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    Ok(Arc::new(CoordinateResolver::new(
        Some(paths::get_coords_dir()),
        options,
    )))
}

fn session_driver(config: &FarmConfig, adb: Arc<AdbTransport>) -> anyhow::Result<Arc<SessionDriver>> {
    Ok(Arc::new(SessionDriver::new(
        adb.clone(),
        adb,
        coordinate_resolver(config.resolve)?,
        config.flow.clone(),
        config.timings,
        config.default_size,
    )))
}

async fn require_attached(adb: &AdbTransport, device: &DeviceId) -> anyhow::Result<()> {
    let attached = adb.list_devices().await?;
    if !attached.contains(device) {
        return Err(ApiError::device_not_found(device.as_str()).into());
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Run the discovery loop until SIGINT or SIGTERM.
async fn run_farm(args: RunArgs) -> anyhow::Result<()> {
    let config = FarmConfig::from_args(&args.flow)?.with_polling(
        Duration::from_millis(args.poll_interval_ms.max(1)),
        Duration::from_secs(args.cooldown_secs),
    );
    let adb = adb();
    let driver = session_driver(&config, adb.clone())?;
    let recorder = Arc::new(CsvRecorder::new(paths::get_outcome_log_path()));
    info!(
        adb = %paths::get_adb_program().display(),
        log = %recorder.path().display(),
        "Starting device farm"
    );

    let discovery = DiscoveryLoop::new(
        adb,
        driver,
        recorder,
        config.poll_interval,
        config.cooldown,
    );

    let shutdown = discovery.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
            _ = sigterm() => info!("Received SIGTERM, shutting down gracefully"),
        }
        shutdown.notify_one();
    });

    discovery.run().await;
    Ok(())
}

async fn run_single_session(args: SessionArgs) -> anyhow::Result<()> {
    let config = FarmConfig::from_args(&args.flow)?;
    let device = DeviceId::from(args.device);
    let adb = adb();
    require_attached(&adb, &device).await?;

    let driver = session_driver(&config, adb)?;
    let report = driver.run(device).await;
    let record = report.to_record();

    let recorder = CsvRecorder::new(paths::get_outcome_log_path());
    if let Err(e) = recorder.record(&record).await {
        warn!("Outcome not logged: {}", e);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "{}: {} in {:.2}s{}",
            record.device,
            record.status,
            record.duration_secs,
            record
                .detail
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn list_devices() -> anyhow::Result<()> {
    let devices = adb().list_devices().await?;
    if devices.is_empty() {
        eprintln!("No devices attached");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

async fn resolve_device(args: ResolveArgs) -> anyhow::Result<()> {
    let device = DeviceId::from(args.device);
    let adb = adb();
    require_attached(&adb, &device).await?;

    let default_size = default_screen_size(args.default_width, args.default_height)?;
    let size = match adb.shell(&device, "wm size").await {
        Ok(output) => parse_wm_size(&output).unwrap_or_else(|| {
            warn!("{}; using {}", ApiError::invalid_output("screen size", &output), default_size);
            default_size
        }),
        Err(e) => {
            warn!("Screen size unavailable, using {}: {}", default_size, e);
            default_size
        }
    };

    let resolver = coordinate_resolver(ResolveOptions {
        require_call: args.require_call,
    })?;
    let capture = async {
        match adb.capture(&device).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("UI capture failed, using fallback grid: {}", e);
                None
            }
        }
    };
    let resolution = resolver.obtain(size, args.force, capture).await;

    if args.json {
        let out = serde_json::json!({
            "device": device,
            "size": size,
            "resolution": resolution,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("# {} {} ({:?})", device, size, resolution.source);
        if !resolution.missing.is_empty() {
            let missing: Vec<String> = resolution.missing.iter().map(|k| k.to_string()).collect();
            println!("# not found in live UI: {}", missing.join(" "));
        }
        print!("{}", resolution.map.to_cache_text());
    }
    Ok(())
}

fn print_grid(args: &GridArgs) -> anyhow::Result<()> {
    let size = ScreenSize::new(args.width, args.height).ok_or_else(|| {
        ApiError::invalid_input(format!(
            "Screen size {}x{} is below the {}px minimum",
            args.width,
            args.height,
            ScreenSize::MIN_DIMENSION
        ))
    })?;
    print_map(size, &fallback_grid(size), args.json)
}

fn print_map(size: ScreenSize, map: &CoordinateMap, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(map)?);
    } else {
        println!("# {}", size);
        print!("{}", map.to_cache_text());
    }
    Ok(())
}

async fn cache_command(action: CacheAction) -> anyhow::Result<()> {
    let resolver = coordinate_resolver(ResolveOptions::default())?;
    match action {
        CacheAction::Show { json } => {
            let entries = resolver.list().await?;
            if entries.is_empty() {
                eprintln!("No cached coordinate maps in {}", paths::get_coords_dir().display());
            }
            if json {
                let mut out = serde_json::Map::new();
                for (size, map) in &entries {
                    out.insert(size.to_string(), serde_json::to_value(map)?);
                }
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (size, map) in &entries {
                    print_map(*size, map, false)?;
                }
            }
        }
        CacheAction::Clear => {
            let removed = resolver.clear().await?;
            println!("Removed {} cached coordinate map(s)", removed);
        }
    }
    Ok(())
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(
                "Failed to register SIGTERM handler: {}, farm will only respond to SIGINT",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM is not available on non-Unix platforms; use a never-completing future.
#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
