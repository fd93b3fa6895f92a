//! Run configuration: what a session does and how long it waits.
//!
//! Built once from command-line flags and shared read-only by every
//! session worker.

use std::time::Duration;

use dialfarm_core::coords::{Key, ScreenSize};
use dialfarm_core::error::ApiError;
use dialfarm_core::resolve::ResolveOptions;

use crate::args::{FlowArgs, Mode};

/// Default interval between device list polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default minimum interval before a finished device is processed again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// A device command that brings up a surface or an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Open the system dialer.
    DialIntent,
    /// Broadcast a secret code, as if it had been dialed.
    SecretCode(String),
    /// Start an explicit `package/activity` component.
    Activity { component: String },
}

impl Trigger {
    /// The shell command that fires this trigger.
    pub fn command(&self) -> String {
        match self {
            Trigger::DialIntent => "am start -a android.intent.action.DIAL".to_string(),
            Trigger::SecretCode(code) => format!(
                "am broadcast -a android.provider.Telephony.SECRET_CODE -d android_secret_code://{}",
                code
            ),
            Trigger::Activity { component } => format!("am start -n {}", component),
        }
    }
}

/// What happens after the code has been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    /// Tap `CALL`, or the bottom-center point when `CALL` is unresolved.
    TapCall,
    /// Nothing to commit.
    None,
}

/// Target application checked for liveness and focus after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCheck {
    pub package: String,
    /// Invocation used to (re)launch the application.
    pub trigger: Trigger,
}

/// The per-device sequence, parameterized by surface, code, commit action
/// and an optional verification target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Opened before injection. `None` skips straight to injection.
    pub surface: Option<Trigger>,
    /// Characters to tap. Empty means no keypad interaction at all.
    pub code: String,
    pub commit: CommitAction,
    /// `Some` for application-launch flows.
    pub verify: Option<LaunchCheck>,
}

impl Flow {
    /// Dial a code on the system dialer and press call.
    pub fn ussd(code: impl Into<String>) -> Self {
        Self {
            surface: Some(Trigger::DialIntent),
            code: code.into(),
            commit: CommitAction::TapCall,
            verify: None,
        }
    }

    /// Make sure an application is running and focused.
    pub fn app_launch(package: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            surface: None,
            code: String::new(),
            commit: CommitAction::None,
            verify: Some(LaunchCheck {
                package: package.into(),
                trigger,
            }),
        }
    }

    /// Whether the keypad is used at all.
    pub fn needs_coordinates(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Settle intervals between UI actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// After the wake key event.
    pub wake: Duration,
    /// After the unlock swipe.
    pub unlock: Duration,
    /// After opening the surface.
    pub surface: Duration,
    /// After tapping the keypad toggle, before recapturing.
    pub keypad_reveal: Duration,
    /// Between consecutive key taps.
    pub tap_delay: Duration,
    /// After each launch invocation, before the focus check.
    pub launch_verify: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            wake: Duration::from_secs(1),
            unlock: Duration::from_secs(1),
            surface: Duration::from_millis(2500),
            keypad_reveal: Duration::from_millis(500),
            tap_delay: Duration::from_millis(80),
            launch_verify: Duration::from_secs(3),
        }
    }
}

impl Timings {
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            wake: Duration::ZERO,
            unlock: Duration::ZERO,
            surface: Duration::ZERO,
            keypad_reveal: Duration::ZERO,
            tap_delay: Duration::ZERO,
            launch_verify: Duration::ZERO,
        }
    }
}

/// Everything a farm run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct FarmConfig {
    pub flow: Flow,
    pub timings: Timings,
    pub resolve: ResolveOptions,
    /// Used when the device does not report its screen size.
    pub default_size: ScreenSize,
    pub poll_interval: Duration,
    pub cooldown: Duration,
}

impl FarmConfig {
    /// Build and validate a configuration from the shared flow flags.
    pub fn from_args(args: &FlowArgs) -> Result<Self, ApiError> {
        let default_size = default_screen_size(args.default_width, args.default_height)?;

        let timings = Timings {
            tap_delay: Duration::from_millis(args.tap_delay_ms),
            ..Timings::default()
        };

        Ok(Self {
            flow: flow_from_args(args)?,
            timings,
            resolve: ResolveOptions {
                require_call: args.require_call,
            },
            default_size,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
        })
    }

    /// Override the discovery loop's polling cadence.
    pub fn with_polling(mut self, poll_interval: Duration, cooldown: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.cooldown = cooldown;
        self
    }
}

fn flow_from_args(args: &FlowArgs) -> Result<Flow, ApiError> {
    match args.mode {
        Mode::Ussd => {
            let code = args.code.as_deref().unwrap_or_default();
            validate_code(code)?;
            Ok(Flow::ussd(code))
        }
        Mode::AppLaunch => {
            let package = args.package.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| {
                ApiError::invalid_input_with_suggestion(
                    "app-launch mode needs a target package",
                    "Pass --package, e.g. --package com.sprd.validationtools",
                )
            })?;
            let trigger = match (&args.secret_code, &args.activity) {
                (Some(code), _) => Trigger::SecretCode(code.clone()),
                (None, Some(activity)) => Trigger::Activity {
                    component: format!("{}/{}", package, activity),
                },
                (None, None) => {
                    return Err(ApiError::invalid_input_with_suggestion(
                        "app-launch mode needs a launch trigger",
                        "Pass --secret-code <code> or --activity <activity>",
                    ))
                }
            };
            Ok(Flow::app_launch(package, trigger))
        }
    }
}

/// Screen size assumed for devices that don't report one.
pub fn default_screen_size(width: u32, height: u32) -> Result<ScreenSize, ApiError> {
    ScreenSize::new(width, height).ok_or_else(|| {
        ApiError::invalid_input_with_suggestion(
            format!("Default screen size {}x{} is too small", width, height),
            format!(
                "Both dimensions must be at least {} pixels",
                ScreenSize::MIN_DIMENSION
            ),
        )
    })
}

/// Reject codes that are empty or use characters outside the keypad.
pub fn validate_code(code: &str) -> Result<(), ApiError> {
    if code.is_empty() {
        return Err(ApiError::invalid_input_with_suggestion(
            "No code to dial",
            "Pass --code, e.g. --code '*#*#2828#*#*'",
        ));
    }
    if let Some(bad) = code.chars().find(|c| Key::from_char(*c).is_none()) {
        return Err(ApiError::invalid_input_with_suggestion(
            format!("Code '{}' contains '{}', which is not on the keypad", code, bad),
            "Codes may only use 0-9, * and #",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Commands};
    use clap::Parser;

    fn flow_args(argv: &[&str]) -> FlowArgs {
        let mut full = vec!["dialfarm", "session", "-d", "emulator-5554"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Session(args) => args.flow,
            other => panic!("expected session command, got {:?}", other),
        }
    }

    #[test]
    fn ussd_flow_from_args() {
        let config = FarmConfig::from_args(&flow_args(&["--code", "*123#"])).unwrap();
        assert_eq!(config.flow, Flow::ussd("*123#"));
        assert_eq!(config.default_size, ScreenSize::DEFAULT);
        assert_eq!(config.timings.tap_delay, Duration::from_millis(80));
        assert!(!config.resolve.require_call);
    }

    #[test]
    fn ussd_flow_requires_code() {
        let err = FarmConfig::from_args(&flow_args(&[])).unwrap_err();
        assert!(err.message.contains("No code"));
    }

    #[test]
    fn code_outside_keypad_is_rejected() {
        let err = validate_code("*12+3#").unwrap_err();
        assert!(err.message.contains("'+'"));
        assert!(validate_code("*#*#2828#*#*").is_ok());
    }

    #[test]
    fn app_launch_with_secret_code() {
        let config = FarmConfig::from_args(&flow_args(&[
            "--mode",
            "app-launch",
            "--package",
            "com.sprd.validationtools",
            "--secret-code",
            "4321",
        ]))
        .unwrap();
        let check = config.flow.verify.as_ref().unwrap();
        assert_eq!(check.package, "com.sprd.validationtools");
        assert_eq!(
            check.trigger.command(),
            "am broadcast -a android.provider.Telephony.SECRET_CODE -d android_secret_code://4321"
        );
        assert!(config.flow.surface.is_none());
        assert!(!config.flow.needs_coordinates());
    }

    #[test]
    fn app_launch_with_activity() {
        let config = FarmConfig::from_args(&flow_args(&[
            "--mode",
            "app-launch",
            "--package",
            "com.zyt.agingtest",
            "--activity",
            ".AgingTest",
        ]))
        .unwrap();
        assert_eq!(
            config.flow.verify.unwrap().trigger.command(),
            "am start -n com.zyt.agingtest/.AgingTest"
        );
    }

    #[test]
    fn app_launch_needs_package_and_trigger() {
        let err = FarmConfig::from_args(&flow_args(&["--mode", "app-launch"])).unwrap_err();
        assert!(err.message.contains("package"));

        let err = FarmConfig::from_args(&flow_args(&[
            "--mode",
            "app-launch",
            "--package",
            "com.example",
        ]))
        .unwrap_err();
        assert!(err.message.contains("trigger"));
    }

    #[test]
    fn tiny_default_size_is_rejected() {
        let err = FarmConfig::from_args(&flow_args(&[
            "--code",
            "1",
            "--default-width",
            "10",
        ]))
        .unwrap_err();
        assert!(err.message.contains("10x1612"));
    }

    #[test]
    fn default_screen_size_for_resolve() {
        assert_eq!(
            default_screen_size(1080, 2400).unwrap(),
            ScreenSize::new(1080, 2400).unwrap()
        );
        assert!(default_screen_size(1080, 8).is_err());
    }

    #[test]
    fn dial_intent_command() {
        assert_eq!(
            Trigger::DialIntent.command(),
            "am start -a android.intent.action.DIAL"
        );
    }
}
