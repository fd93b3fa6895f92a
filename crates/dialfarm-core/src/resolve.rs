//! Coordinate resolution from a UI snapshot.
//!
//! Turns the elements of one snapshot into a [`CoordinateMap`]:
//!
//! 1. Classify every element (see [`crate::elements::classify`]); the first
//!    element in document order to claim a key keeps it.
//! 2. Tap point = integer midpoint of the element's bounds.
//! 3. Keypad incomplete → the whole map comes from the fallback grid.
//! 4. Keypad complete but no `CALL` → second pass over all elements for
//!    call-ish labels.
//! 5. Still no `CALL` and the caller requires one → fallback grid.
//!
//! A missing snapshot (capture failed) goes straight to the fallback grid.
//! Nothing here fails: the grid guarantees a complete answer.

use serde::{Deserialize, Serialize};

use crate::coords::{CoordinateMap, Key, ScreenSize};
use crate::elements::classify::{classify, find_call_candidate};
use crate::elements::hierarchy::UiSnapshot;
use crate::grid::fallback_grid;

/// Where a resolved map came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Every key came from the live UI.
    Live,
    /// Keypad from the live UI, `CALL` from the second-pass search.
    LiveWithCallSearch,
    /// Keypad from the live UI, no `CALL` (commit uses the bottom-center tap).
    LiveWithoutCall,
    /// Fallback grid.
    Fallback,
    /// Loaded from the durable cache.
    Cached,
}

/// Options that change when a live map is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Treat a missing `CALL` key as incomplete.
    pub require_call: bool,
}

/// The outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub map: CoordinateMap,
    pub source: ResolutionSource,
    /// Keypad keys the live snapshot could not supply (empty unless the
    /// grid took over).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Key>,
}

impl Resolution {
    fn fallback(size: ScreenSize, missing: Vec<Key>) -> Self {
        Self {
            map: fallback_grid(size),
            source: ResolutionSource::Fallback,
            missing,
        }
    }
}

/// Classify every element and collect centers. When several elements match
/// the same key the last one in document order wins.
#[must_use]
pub fn collect_keys(snapshot: &UiSnapshot) -> CoordinateMap {
    let mut map = CoordinateMap::new();
    for element in &snapshot.elements {
        if let Some(key) = classify(element) {
            map.insert(key, element.center());
        }
    }
    map
}

/// Resolve a coordinate map for a screen, optionally from a live snapshot.
#[must_use]
pub fn resolve(
    snapshot: Option<&UiSnapshot>,
    size: ScreenSize,
    options: ResolveOptions,
) -> Resolution {
    let Some(snapshot) = snapshot else {
        return Resolution::fallback(size, Key::KEYPAD.to_vec());
    };

    let mut map = collect_keys(snapshot);
    if !map.has_complete_keypad() {
        return Resolution::fallback(size, map.missing_keypad_keys());
    }
    if map.contains(Key::Call) {
        return Resolution {
            map,
            source: ResolutionSource::Live,
            missing: Vec::new(),
        };
    }

    if let Some(candidate) = find_call_candidate(&snapshot.elements) {
        map.insert(Key::Call, candidate.center());
        return Resolution {
            map,
            source: ResolutionSource::LiveWithCallSearch,
            missing: Vec::new(),
        };
    }

    if options.require_call {
        return Resolution::fallback(size, Vec::new());
    }
    Resolution {
        map,
        source: ResolutionSource::LiveWithoutCall,
        missing: Vec::new(),
    }
}
