//! CLI argument parsing with clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};

const DEVICE_HELP: &str = "Target device serial, as listed by 'dialfarm devices'";

/// Android device farm automation.
///
/// Watches the debug bridge for attached devices and drives each one through
/// wake, unlock, dial and verification, logging one outcome per device.
/// Keypad coordinates are read from the live UI, cached per screen size, and
/// fall back to a computed grid when the UI can't be read.
#[derive(Debug, Parser)]
#[command(name = "dialfarm", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Poll for devices and process each one as it attaches
    #[command(after_help = "\
Examples:
  dialfarm run --code '*#*#2828#*#*'                  # Dial a code on every device
  dialfarm run --code '*123#' --tap-delay-ms 150      # Slower tapping for laggy dialers
  dialfarm run --mode app-launch --package com.sprd.validationtools --secret-code 4321
  dialfarm run --mode app-launch --package com.zyt.agingtest --activity .AgingTest
  RUST_LOG=debug dialfarm run --code '*123#'          # Log every device command")]
    Run(RunArgs),

    /// Run one session against one device and record the outcome
    #[command(after_help = "\
Examples:
  dialfarm session -d R58M123ABC --code '*123#'
  dialfarm session -d emulator-5554 --mode app-launch --package com.example --secret-code 4321")]
    Session(SessionArgs),

    /// List devices ready for commands
    Devices,

    /// Resolve and print the keypad coordinates of a device
    #[command(after_help = "\
Open the dialer on the device first so the keypad is on screen.

Examples:
  dialfarm resolve -d R58M123ABC              # Use the cache when present
  dialfarm resolve -d R58M123ABC --force      # Re-read the live UI
  dialfarm resolve -d R58M123ABC --json       # Machine-readable output")]
    Resolve(ResolveArgs),

    /// Print the fallback keypad grid for a screen size
    Grid(GridArgs),

    /// Inspect or clear the coordinate cache
    Cache(CacheArgs),

    /// Show an end-to-end usage example
    Examples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Open the dialer, enter the code, press call
    Ussd,
    /// Make sure an application is running and in the foreground
    AppLaunch,
}

/// Flags describing what a session does.
#[derive(Debug, Clone, clap::Args)]
pub struct FlowArgs {
    /// Session flow
    #[arg(long, value_enum, default_value_t = Mode::Ussd)]
    pub mode: Mode,

    /// Code to dial (0-9, * and #)
    #[arg(short, long)]
    pub code: Option<String>,

    /// Package to launch and verify (app-launch mode)
    #[arg(long)]
    pub package: Option<String>,

    /// Activity to start inside the package (app-launch mode)
    #[arg(long, conflicts_with = "secret_code")]
    pub activity: Option<String>,

    /// Secret code broadcast that launches the package (app-launch mode)
    #[arg(long)]
    pub secret_code: Option<String>,

    /// Delay between key taps in milliseconds
    #[arg(long, default_value_t = 80, value_name = "MS")]
    pub tap_delay_ms: u64,

    /// Use the fallback grid when the live UI has no recognisable call button
    #[arg(long)]
    pub require_call: bool,

    /// Screen width assumed when a device doesn't report one
    #[arg(long, default_value_t = 720, value_name = "PX")]
    pub default_width: u32,

    /// Screen height assumed when a device doesn't report one
    #[arg(long, default_value_t = 1612, value_name = "PX")]
    pub default_height: u32,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub flow: FlowArgs,

    /// Interval between device list polls in milliseconds
    #[arg(long, default_value_t = 2000, value_name = "MS")]
    pub poll_interval_ms: u64,

    /// Seconds before a processed device is processed again
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub cooldown_secs: u64,
}

#[derive(Debug, clap::Args)]
pub struct SessionArgs {
    #[arg(short, long, help = DEVICE_HELP)]
    pub device: String,

    #[command(flatten)]
    pub flow: FlowArgs,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ResolveArgs {
    #[arg(short, long, help = DEVICE_HELP)]
    pub device: String,

    /// Ignore the cache and read the live UI
    #[arg(long)]
    pub force: bool,

    /// Use the fallback grid when the live UI has no recognisable call button
    #[arg(long)]
    pub require_call: bool,

    /// Screen width assumed when the device doesn't report one
    #[arg(long, default_value_t = 720, value_name = "PX")]
    pub default_width: u32,

    /// Screen height assumed when the device doesn't report one
    #[arg(long, default_value_t = 1612, value_name = "PX")]
    pub default_height: u32,

    /// Print the map as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct GridArgs {
    /// Screen width in pixels
    #[arg(long, default_value_t = 720)]
    pub width: u32,

    /// Screen height in pixels
    #[arg(long, default_value_t = 1612)]
    pub height: u32,

    /// Print the grid as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print every cached coordinate map
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every cached coordinate map
    Clear,
}

/// End-to-end example text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"End-to-end example: dial a service code on a rack of phones

# 1. Check that the phones are visible and authorized
dialfarm devices

# 2. Open the dialer on one phone and check the keypad is recognised
dialfarm resolve -d R58M123ABC --force

# 3. If the live UI can't be read, this is the grid that will be tapped
dialfarm grid --width 720 --height 1612

# 4. Try the whole sequence on that one phone
dialfarm session -d R58M123ABC --code '*#*#2828#*#*'

# 5. Process every phone as it is plugged in (Ctrl+C to stop)
dialfarm run --code '*#*#2828#*#*'

# Outcomes are appended to outcomes.csv in the data directory
# ($DIALFARM_DATA_DIR, $XDG_DATA_HOME/dialfarm or ~/.dialfarm).
# If a dialer update moves the keypad, start over with:
dialfarm cache clear
"#;
