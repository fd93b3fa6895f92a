//! On-screen UI element types.
//!
//! A device UI dump is a tree of nodes, each with a handful of string
//! attributes and an axis-aligned bounding box in screen pixels. dialfarm
//! only needs a flat view of that tree (document order), so the hierarchy
//! parser produces a `Vec<UiElement>` and the classifier works over it.
//!
//! # Modules
//!
//! - [`hierarchy`]: parse a uiautomator XML dump into a [`hierarchy::UiSnapshot`]
//! - [`classify`]: map elements to logical keypad keys

pub mod classify;
pub mod hierarchy;

use serde::{Deserialize, Serialize};

use crate::coords::Point;

/// Axis-aligned bounding box in integer pixels.
///
/// Always satisfies `x1 < x2` and `y1 < y2`; use [`Bounds::new`] to enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Bounds {
    /// Create bounds, rejecting empty or inverted rectangles.
    #[must_use]
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Parse the uiautomator `[x1,y1][x2,y2]` form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (first, second) = s.split_once("][")?;
        let (x1, y1) = parse_pair(first)?;
        let (x2, y2) = parse_pair(second)?;
        Self::new(x1, y1, x2, y2)
    }

    /// Integer midpoint, rounding toward zero.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            self.x1 + (self.x2 - self.x1) / 2,
            self.y1 + (self.y2 - self.y1) / 2,
        )
    }
}

fn parse_pair(s: &str) -> Option<(u32, u32)> {
    let (x, y) = s.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// A single element of a UI snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiElement {
    /// Visible text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Stable resource tag such as `com.android.dialer:id/one`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Accessibility description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bounds: Bounds,
}

impl UiElement {
    #[must_use]
    pub fn new(bounds: Bounds) -> Self {
        Self {
            text: None,
            identifier: None,
            description: None,
            bounds,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = non_empty(text.into());
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = non_empty(identifier.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_empty(description.into());
        self
    }

    /// Tap point for this element.
    #[must_use]
    pub fn center(&self) -> Point {
        self.bounds.center()
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
