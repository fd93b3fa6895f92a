//! Keypad coordinate maps and their cache encoding.
//!
//! A [`CoordinateMap`] maps each logical [`Key`] of a phone keypad to the
//! screen point that should be tapped for it. Maps are persisted as plain
//! text, one `KEY:x,y` entry per line:
//!
//! ```text
//! 1:120,1210
//! *:120,1680
//! CALL:360,1840
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A logical key on the dial pad.
///
/// Ordered digits first, then `*`, `#`, `CALL`, which keeps cache files and
/// printed maps stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Digit(u8),
    Star,
    Pound,
    Call,
}

impl Key {
    /// The twelve keys that must resolve before a code can be injected,
    /// in row-major keypad order.
    pub const KEYPAD: [Key; 12] = [
        Key::Digit(1),
        Key::Digit(2),
        Key::Digit(3),
        Key::Digit(4),
        Key::Digit(5),
        Key::Digit(6),
        Key::Digit(7),
        Key::Digit(8),
        Key::Digit(9),
        Key::Star,
        Key::Digit(0),
        Key::Pound,
    ];

    /// Map a code character to its key. `CALL` has no character form.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0'..='9' => Some(Key::Digit(c as u8 - b'0')),
            '*' => Some(Key::Star),
            '#' => Some(Key::Pound),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Digit(d) => write!(f, "{}", d),
            Key::Star => write!(f, "*"),
            Key::Pound => write!(f, "#"),
            Key::Call => write!(f, "CALL"),
        }
    }
}

impl FromStr for Key {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "CALL" {
            return Ok(Key::Call);
        }
        let mut chars = s.chars();
        match (chars.next().and_then(Key::from_char), chars.next()) {
            (Some(key), None) => Ok(key),
            _ => Err(ApiError::invalid_input_with_suggestion(
                format!("Unknown key '{}'", s),
                "Keys are 0-9, *, # and CALL",
            )),
        }
    }
}

// Keys serialize as their display form so JSON output reads like the cache file.
impl Serialize for Key {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A tap point in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Physical screen geometry of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    /// Geometry assumed when the device does not report one.
    pub const DEFAULT: ScreenSize = ScreenSize {
        width: 720,
        height: 1612,
    };

    /// Smallest accepted dimension. Anything below is treated as a bogus report.
    pub const MIN_DIMENSION: u32 = 32;

    /// Create a screen size, rejecting implausibly small geometries.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width >= Self::MIN_DIMENSION && height >= Self::MIN_DIMENSION)
            .then_some(Self { width, height })
    }

    /// Point at the given fraction (in percent) of width and height.
    #[must_use]
    pub fn percent(&self, x_pct: u32, y_pct: u32) -> Point {
        Point::new(
            (u64::from(self.width) * u64::from(x_pct) / 100) as u32,
            (u64::from(self.height) * u64::from(y_pct) / 100) as u32,
        )
    }

    /// Bottom-center tap used when no `CALL` key was resolved.
    #[must_use]
    pub fn call_fallback(&self) -> Point {
        Point::new(self.width / 2, self.percent(0, 93).y)
    }
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Mapping from logical key to tap point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateMap {
    points: BTreeMap<Key, Point>,
}

impl CoordinateMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a point.
    pub fn insert(&mut self, key: Key, point: Point) {
        self.points.insert(key, point);
    }

    #[must_use]
    pub fn get(&self, key: Key) -> Option<Point> {
        self.points.get(&key).copied()
    }

    #[must_use]
    pub fn contains(&self, key: Key) -> bool {
        self.points.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, Point)> + '_ {
        self.points.iter().map(|(k, p)| (*k, *p))
    }

    /// Keypad keys (digits, `*`, `#`) with no point yet.
    #[must_use]
    pub fn missing_keypad_keys(&self) -> Vec<Key> {
        Key::KEYPAD
            .iter()
            .copied()
            .filter(|k| !self.contains(*k))
            .collect()
    }

    /// True once all ten digits plus `*` and `#` are present.
    #[must_use]
    pub fn has_complete_keypad(&self) -> bool {
        Key::KEYPAD.iter().all(|k| self.contains(*k))
    }

    /// Encode as cache text, one `KEY:x,y` line per entry.
    #[must_use]
    pub fn to_cache_text(&self) -> String {
        let mut out = String::new();
        for (key, point) in self.iter() {
            out.push_str(&format!("{}:{}\n", key, point));
        }
        out
    }

    /// Decode cache text written by [`CoordinateMap::to_cache_text`].
    ///
    /// Blank lines are skipped; any other malformed line rejects the whole
    /// file so a torn or hand-edited cache is never half-trusted.
    pub fn from_cache_text(text: &str) -> Result<Self, ApiError> {
        let mut map = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || ApiError::invalid_input(format!("line {}: '{}'", idx + 1, line));
            let (key, value) = line.split_once(':').ok_or_else(bad)?;
            let key: Key = key.trim().parse().map_err(|_| bad())?;
            let (x, y) = value.split_once(',').ok_or_else(bad)?;
            let x = x.trim().parse().map_err(|_| bad())?;
            let y = y.trim().parse().map_err(|_| bad())?;
            map.insert(key, Point::new(x, y));
        }
        Ok(map)
    }
}

impl FromIterator<(Key, Point)> for CoordinateMap {
    fn from_iter<I: IntoIterator<Item = (Key, Point)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
