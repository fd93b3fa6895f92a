//! Scripted collaborators for session and discovery tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dialfarm_core::coords::{Key, Point};
use dialfarm_core::device::DeviceId;
use dialfarm_core::elements::hierarchy::UiSnapshot;
use dialfarm_core::elements::{Bounds, UiElement};
use dialfarm_core::error::ApiError;
use dialfarm_core::outcome::OutcomeRecord;

use crate::farm::recorder::OutcomeSink;
use crate::farm::transport::{SnapshotProvider, Transport};

// ============================================================================
// UI fixtures
// ============================================================================

/// Center of a key in [`dial_pad_elements`].
pub fn key_center(key: Key) -> Point {
    if key == Key::Call {
        return Point::new(360, 1560);
    }
    let idx = Key::KEYPAD.iter().position(|k| *k == key).unwrap_or(0) as u32;
    Point::new(140 + (idx % 3) * 220, 960 + (idx / 3) * 130)
}

/// A 3x4 text-labelled dial pad plus a call button identified by resource id.
pub fn dial_pad_elements() -> Vec<UiElement> {
    let mut elements: Vec<UiElement> = Key::KEYPAD
        .iter()
        .map(|key| {
            let c = key_center(*key);
            UiElement::new(Bounds::new(c.x - 100, c.y - 60, c.x + 100, c.y + 60).unwrap())
                .with_text(key.to_string())
        })
        .collect();
    elements.push(
        UiElement::new(Bounds::new(300, 1500, 420, 1620).unwrap())
            .with_identifier("com.android.dialer:id/dialpad_voice_call_button"),
    );
    elements
}

pub fn dial_pad_snapshot() -> UiSnapshot {
    UiSnapshot::from_elements(dial_pad_elements())
}

/// A dialer showing only the floating "show keypad" button.
pub fn hidden_keypad_snapshot() -> UiSnapshot {
    UiSnapshot::from_elements(vec![UiElement::new(
        Bounds::new(560, 1400, 680, 1520).unwrap(),
    )
    .with_identifier("com.android.dialer:id/fab_show_dialpad")])
}

// ============================================================================
// Transport
// ============================================================================

struct Rule {
    prefix: String,
    replies: VecDeque<Result<String, ApiError>>,
    fallback: Result<String, ApiError>,
}

/// Transport answering shell commands from prefix rules and logging every
/// command it receives. Commands matching no rule return empty output.
#[derive(Default)]
pub struct FakeTransport {
    devices: Mutex<Option<Vec<DeviceId>>>,
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<(DeviceId, String)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the attached device list.
    pub fn set_devices(&self, devices: &[&str]) {
        *self.devices.lock().unwrap() = Some(devices.iter().map(|d| DeviceId::from(*d)).collect());
    }

    /// Make `list_devices` fail until the next `set_devices`.
    pub fn fail_device_list(&self) {
        *self.devices.lock().unwrap() = None;
    }

    /// Always answer commands starting with `prefix` with `output`.
    pub fn on(&self, prefix: &str, output: &str) -> &Self {
        self.push_rule(prefix, Vec::new(), Ok(output.to_string()))
    }

    /// Answer `prefix` with `outputs` in order, then keep repeating the last.
    pub fn on_seq(&self, prefix: &str, outputs: &[&str]) -> &Self {
        let replies: Vec<_> = outputs.iter().map(|o| Ok(o.to_string())).collect();
        let fallback = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Ok(String::new()));
        self.push_rule(prefix, replies, fallback)
    }

    /// Fail every command starting with `prefix`.
    pub fn fail(&self, prefix: &str) -> &Self {
        self.push_rule(
            prefix,
            Vec::new(),
            Err(ApiError::transport_failed(prefix, "error: device offline")),
        )
    }

    fn push_rule(
        &self,
        prefix: &str,
        replies: Vec<Result<String, ApiError>>,
        fallback: Result<String, ApiError>,
    ) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            replies: replies.into(),
            fallback,
        });
        self
    }

    /// Every shell command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Received commands starting with `prefix`.
    pub fn commands_with(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Points of every `input tap`, in order.
    pub fn taps(&self) -> Vec<Point> {
        self.commands_with("input tap ")
            .iter()
            .filter_map(|c| {
                let mut nums = c["input tap ".len()..].split(' ');
                Some(Point::new(
                    nums.next()?.parse().ok()?,
                    nums.next()?.parse().ok()?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn list_devices(&self) -> Result<Vec<DeviceId>, ApiError> {
        self.devices
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::transport_failed("adb devices", "daemon not running"))
    }

    async fn shell(&self, device: &DeviceId, command: &str) -> Result<String, ApiError> {
        self.log
            .lock()
            .unwrap()
            .push((device.clone(), command.to_string()));

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| command.starts_with(&r.prefix)) {
            Some(rule) => rule
                .replies
                .pop_front()
                .unwrap_or_else(|| rule.fallback.clone()),
            None => Ok(String::new()),
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Snapshot provider returning queued snapshots, then failing.
#[derive(Default)]
pub struct FakeSnapshots {
    queue: Mutex<VecDeque<UiSnapshot>>,
    captures: Mutex<usize>,
}

impl FakeSnapshots {
    pub fn new(snapshots: Vec<UiSnapshot>) -> Self {
        Self {
            queue: Mutex::new(snapshots.into()),
            captures: Mutex::new(0),
        }
    }

    pub fn captures(&self) -> usize {
        *self.captures.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotProvider for FakeSnapshots {
    async fn capture(&self, _device: &DeviceId) -> Result<UiSnapshot, ApiError> {
        *self.captures.lock().unwrap() += 1;
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::transport_failed("uiautomator dump", "ERROR: null root node"))
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<OutcomeRecord>>,
}

impl MemoryRecorder {
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutcomeSink for MemoryRecorder {
    async fn record(&self, record: &OutcomeRecord) -> Result<(), ApiError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
