//! Per-device session state machine.
//!
//! A session drives one device from detection to a classified outcome:
//!
//! ```text
//! NEW → AWAKENING → UNLOCKING → OPENING_SURFACE → INJECTING → COMMITTING
//!     → VERIFYING (launch flows only) → DONE
//! ```
//!
//! Any transport error while performing a state's actions moves the session
//! to FAILED. Either way [`SessionDriver::run`] returns exactly one
//! [`SessionReport`]; nothing here propagates an error to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use dialfarm_core::coords::{CoordinateMap, Key, Point, ScreenSize};
use dialfarm_core::device::{
    is_package_focused, parse_pidof, parse_screen_on, parse_wm_size, DeviceId,
};
use dialfarm_core::elements::classify::find_keypad_toggle;
use dialfarm_core::elements::hierarchy::UiSnapshot;
use dialfarm_core::error::ApiError;
use dialfarm_core::outcome::{OutcomeRecord, Status};
use dialfarm_core::resolve::{collect_keys, ResolutionSource};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::farm::config::{CommitAction, Flow, LaunchCheck, Timings};
use crate::farm::resolver::CoordinateResolver;
use crate::farm::transport::{SnapshotProvider, Transport};

/// Duration of the unlock swipe gesture in milliseconds.
const SWIPE_MS: u32 = 300;

/// Unique identifier for a session, used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Awakening,
    Unlocking,
    OpeningSurface,
    Injecting,
    Committing,
    Verifying,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "NEW",
            SessionState::Awakening => "AWAKENING",
            SessionState::Unlocking => "UNLOCKING",
            SessionState::OpeningSurface => "OPENING_SURFACE",
            SessionState::Injecting => "INJECTING",
            SessionState::Committing => "COMMITTING",
            SessionState::Verifying => "VERIFYING",
            SessionState::Done => "DONE",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// The single result of one session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: SessionId,
    pub device: DeviceId,
    /// `Done` or `Failed`.
    pub state: SessionState,
    pub status: Status,
    pub duration: Duration,
    pub finished_at: DateTime<Local>,
    /// How the keypad coordinates were obtained, if they were needed.
    pub source: Option<ResolutionSource>,
    /// Launch invocations issued during verification.
    pub invocations: u32,
    pub detail: Option<String>,
}

impl SessionReport {
    /// Report for a worker that died before producing its own report.
    pub fn crashed(device: DeviceId, duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            session: SessionId::new(),
            device,
            state: SessionState::Failed,
            status: Status::Error,
            duration,
            finished_at: Local::now(),
            source: None,
            invocations: 0,
            detail: Some(reason.into()),
        }
    }

    pub fn to_record(&self) -> OutcomeRecord {
        OutcomeRecord {
            device: self.device.clone(),
            status: self.status,
            duration_secs: self.duration.as_secs_f64(),
            timestamp: self.finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            detail: self.detail.clone(),
        }
    }
}

/// Working state of one session, owned by its worker.
struct Session {
    id: SessionId,
    device: DeviceId,
    state: SessionState,
    started: Instant,
    size: ScreenSize,
    map: Option<CoordinateMap>,
    source: Option<ResolutionSource>,
    skipped: Vec<char>,
    invocations: u32,
    verdict: Option<Status>,
    error: Option<ApiError>,
}

impl Session {
    fn new(device: DeviceId, size: ScreenSize) -> Self {
        Self {
            id: SessionId::new(),
            device,
            state: SessionState::New,
            started: Instant::now(),
            size,
            map: None,
            source: None,
            skipped: Vec::new(),
            invocations: 0,
            verdict: None,
            error: None,
        }
    }

    fn into_report(self) -> SessionReport {
        let (status, detail) = match (&self.error, self.verdict) {
            (Some(e), _) => (Status::Error, Some(e.to_string())),
            (None, Some(verdict)) => (verdict, None),
            (None, None) if self.skipped.is_empty() => (Status::Dialed, None),
            (None, None) => {
                let chars: String = self.skipped.iter().collect();
                (
                    Status::PartialInjection,
                    Some(format!("skipped characters: {}", chars)),
                )
            }
        };
        SessionReport {
            session: self.id,
            device: self.device,
            state: self.state,
            status,
            duration: self.started.elapsed(),
            finished_at: Local::now(),
            source: self.source,
            invocations: self.invocations,
            detail,
        }
    }
}

/// Runs sessions against devices. Shared by every worker.
pub struct SessionDriver {
    transport: Arc<dyn Transport>,
    snapshots: Arc<dyn SnapshotProvider>,
    resolver: Arc<CoordinateResolver>,
    flow: Flow,
    timings: Timings,
    default_size: ScreenSize,
}

impl SessionDriver {
    pub fn new(
        transport: Arc<dyn Transport>,
        snapshots: Arc<dyn SnapshotProvider>,
        resolver: Arc<CoordinateResolver>,
        flow: Flow,
        timings: Timings,
        default_size: ScreenSize,
    ) -> Self {
        Self {
            transport,
            snapshots,
            resolver,
            flow,
            timings,
            default_size,
        }
    }

    /// Drive one device through the whole sequence.
    pub async fn run(&self, device: DeviceId) -> SessionReport {
        let mut session = Session::new(device, self.default_size);
        info!(session = %session.id, device = %session.device, "Session started");

        loop {
            let next = self.next_state(session.state);
            session.state = next;
            if next.is_terminal() {
                break;
            }
            debug!(session = %session.id, device = %session.device, state = %next, "Entering state");

            if let Err(e) = self.enter(&mut session).await {
                warn!(
                    session = %session.id,
                    device = %session.device,
                    state = %next,
                    "Session aborted: {}",
                    e
                );
                session.state = SessionState::Failed;
                session.error = Some(e);
                break;
            }
        }

        let report = session.into_report();
        info!(
            session = %report.session,
            device = %report.device,
            state = %report.state,
            status = %report.status,
            source = ?report.source,
            invocations = report.invocations,
            "Session finished in {:.2}s",
            report.duration.as_secs_f64()
        );
        report
    }

    fn next_state(&self, state: SessionState) -> SessionState {
        use SessionState::*;
        match state {
            New => Awakening,
            Awakening => Unlocking,
            Unlocking => OpeningSurface,
            OpeningSurface => Injecting,
            Injecting => Committing,
            Committing if self.flow.verify.is_some() => Verifying,
            Committing | Verifying => Done,
            Done | Failed => state,
        }
    }

    async fn enter(&self, s: &mut Session) -> Result<(), ApiError> {
        match s.state {
            SessionState::Awakening => self.wake(s).await,
            SessionState::Unlocking => self.unlock(s).await,
            SessionState::OpeningSurface => self.open_surface(s).await,
            SessionState::Injecting => self.inject(s).await,
            SessionState::Committing => self.commit(s).await,
            SessionState::Verifying => self.verify(s).await,
            SessionState::New | SessionState::Done | SessionState::Failed => Ok(()),
        }
    }

    // ========================================================================
    // States
    // ========================================================================

    async fn wake(&self, s: &Session) -> Result<(), ApiError> {
        if self.check(&s.device, "dumpsys power", parse_screen_on).await {
            debug!(device = %s.device, "Screen already on");
            return Ok(());
        }
        self.transport.shell(&s.device, "input keyevent 26").await?;
        sleep(self.timings.wake).await;
        Ok(())
    }

    async fn unlock(&self, s: &mut Session) -> Result<(), ApiError> {
        self.transport.shell(&s.device, "input keyevent 82").await?;
        s.size = self.screen_size(&s.device).await;

        let from = s.size.percent(50, 80);
        let to = s.size.percent(50, 25);
        let swipe = format!(
            "input swipe {} {} {} {} {}",
            from.x, from.y, to.x, to.y, SWIPE_MS
        );
        self.transport.shell(&s.device, &swipe).await?;
        sleep(self.timings.unlock).await;
        Ok(())
    }

    async fn open_surface(&self, s: &Session) -> Result<(), ApiError> {
        let Some(trigger) = &self.flow.surface else {
            return Ok(());
        };
        self.transport.shell(&s.device, &trigger.command()).await?;
        sleep(self.timings.surface).await;
        Ok(())
    }

    async fn inject(&self, s: &mut Session) -> Result<(), ApiError> {
        if !self.flow.needs_coordinates() {
            return Ok(());
        }

        let resolution = self
            .resolver
            .obtain(s.size, false, self.capture_keypad(&s.device))
            .await;
        info!(
            session = %s.id,
            device = %s.device,
            size = %s.size,
            source = ?resolution.source,
            "Coordinates resolved"
        );

        for c in self.flow.code.chars() {
            match Key::from_char(c).and_then(|key| resolution.map.get(key)) {
                Some(point) => {
                    self.tap(&s.device, point).await?;
                    sleep(self.timings.tap_delay).await;
                }
                None => {
                    warn!(device = %s.device, character = %c, "No coordinate for character, skipped");
                    s.skipped.push(c);
                }
            }
        }

        s.source = Some(resolution.source);
        s.map = Some(resolution.map);
        Ok(())
    }

    async fn commit(&self, s: &Session) -> Result<(), ApiError> {
        match self.flow.commit {
            CommitAction::None => Ok(()),
            CommitAction::TapCall => {
                let point = s
                    .map
                    .as_ref()
                    .and_then(|map| map.get(Key::Call))
                    .unwrap_or_else(|| s.size.call_fallback());
                self.tap(&s.device, point).await
            }
        }
    }

    /// Classify the launch target's state, re-invoking it at most twice.
    async fn verify(&self, s: &mut Session) -> Result<(), ApiError> {
        let Some(check) = &self.flow.verify else {
            return Ok(());
        };

        let pidof = format!("pidof {}", check.package);
        let running = self.check(&s.device, &pidof, parse_pidof).await;

        let verdict = if running {
            if self.is_focused(&s.device, check).await {
                Status::AlreadyRunning
            } else if self.invoke_and_check(s, check).await? {
                Status::BroughtToForeground
            } else {
                Status::ForegroundFailed
            }
        } else if self.invoke_and_check(s, check).await? {
            Status::Launched
        } else if self.invoke_and_check(s, check).await? {
            Status::LaunchedAfterRetry
        } else {
            Status::Failed
        };

        s.verdict = Some(verdict);
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn tap(&self, device: &DeviceId, point: Point) -> Result<(), ApiError> {
        self.transport
            .shell(device, &format!("input tap {} {}", point.x, point.y))
            .await
            .map(|_| ())
    }

    /// Run a read-only query and interpret its output. A failed command
    /// counts as `false`.
    async fn check<F>(&self, device: &DeviceId, command: &str, parse: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match self.transport.shell(device, command).await {
            Ok(output) => parse(&output),
            Err(e) => {
                debug!(device = %device, "'{}' failed, treating as false: {}", command, e);
                false
            }
        }
    }

    async fn is_focused(&self, device: &DeviceId, check: &LaunchCheck) -> bool {
        self.check(device, "dumpsys window", |out| {
            is_package_focused(out, &check.package)
        })
        .await
    }

    async fn invoke_and_check(&self, s: &mut Session, check: &LaunchCheck) -> Result<bool, ApiError> {
        s.invocations += 1;
        debug!(device = %s.device, attempt = s.invocations, "Invoking {}", check.package);
        self.transport
            .shell(&s.device, &check.trigger.command())
            .await?;
        sleep(self.timings.launch_verify).await;
        Ok(self.is_focused(&s.device, check).await)
    }

    /// Screen size reported by the device, or the configured default.
    async fn screen_size(&self, device: &DeviceId) -> ScreenSize {
        match self.transport.shell(device, "wm size").await {
            Ok(output) => parse_wm_size(&output).unwrap_or_else(|| {
                warn!(
                    device = %device,
                    "{}; using {}",
                    ApiError::invalid_output("screen size", &output),
                    self.default_size
                );
                self.default_size
            }),
            Err(e) => {
                warn!(device = %device, "Screen size unavailable, using {}: {}", self.default_size, e);
                self.default_size
            }
        }
    }

    /// Capture the dialer for resolution, revealing a hidden keypad once.
    ///
    /// `None` when the capture fails, so the resolver falls back to the grid.
    async fn capture_keypad(&self, device: &DeviceId) -> Option<UiSnapshot> {
        let snapshot = match self.snapshots.capture(device).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(device = %device, "UI capture failed, using fallback grid: {}", e);
                return None;
            }
        };
        if collect_keys(&snapshot).has_complete_keypad() {
            return Some(snapshot);
        }
        let Some(toggle) = find_keypad_toggle(&snapshot.elements) else {
            return Some(snapshot);
        };

        debug!(device = %device, "Keypad hidden, tapping toggle");
        if let Err(e) = self.tap(device, toggle.center()).await {
            warn!(device = %device, "Keypad toggle tap failed: {}", e);
            return Some(snapshot);
        }
        sleep(self.timings.keypad_reveal).await;

        match self.snapshots.capture(device).await {
            Ok(revealed) => Some(revealed),
            Err(e) => {
                warn!(device = %device, "UI recapture failed: {}", e);
                Some(snapshot)
            }
        }
    }
}
