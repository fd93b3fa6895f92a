//! Device handles and parsers for debug-bridge command output.
//!
//! These are pure functions over the text the bridge returns, kept here so
//! they can be tested without a device attached.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::ScreenSize;

/// Transport-assigned identifier of an attached device (its serial).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Parse `adb devices` output into the serials that are ready for commands.
///
/// Devices in `unauthorized`, `offline` or other states are skipped; they
/// can't run shell commands yet and will show up again once ready.
#[must_use]
pub fn parse_device_list(output: &str) -> Vec<DeviceId> {
    output
        .lines()
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            match (cols.next(), cols.next()) {
                (Some(serial), Some("device")) => Some(DeviceId::from(serial)),
                _ => None,
            }
        })
        .collect()
}

/// Parse `wm size` output.
///
/// Prefers `Override size:` over `Physical size:` since taps land in the
/// overridden coordinate space. Returns `None` for missing or implausible
/// sizes.
#[must_use]
pub fn parse_wm_size(output: &str) -> Option<ScreenSize> {
    let mut physical = None;
    let mut override_size = None;
    for line in output.lines() {
        let Some(size) = find_dimensions(line) else {
            continue;
        };
        if line.contains("Override") {
            override_size = Some(size);
        } else if physical.is_none() {
            physical = Some(size);
        }
    }
    override_size.or(physical)
}

/// First `<digits>x<digits>` in a line.
fn find_dimensions(line: &str) -> Option<ScreenSize> {
    line.split(|c: char| c.is_whitespace() || c == ':')
        .filter_map(|token| {
            let (w, h) = token.split_once('x')?;
            ScreenSize::new(w.parse().ok()?, h.parse().ok()?)
        })
        .next()
}

/// Whether `dumpsys power` reports the display as on.
#[must_use]
pub fn parse_screen_on(output: &str) -> bool {
    output.contains("state=ON")
        || output.contains("mWakefulness=Awake")
        || output.contains("mHoldingDisplaySuspendBlocker=true")
}

/// The `mCurrentFocus` line from `dumpsys window` output, trimmed.
#[must_use]
pub fn focused_window(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("mCurrentFocus"))
}

/// Whether the focused window belongs to `package`.
#[must_use]
pub fn is_package_focused(output: &str, package: &str) -> bool {
    focused_window(output).is_some_and(|line| line.contains(package))
}

/// Whether `pidof` output names at least one process id.
#[must_use]
pub fn parse_pidof(output: &str) -> bool {
    output
        .split_whitespace()
        .any(|token| token.chars().all(|c| c.is_ascii_digit()))
}
