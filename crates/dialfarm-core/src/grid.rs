//! Fallback keypad grid.
//!
//! When a live UI dump can't produce a complete keypad, dialfarm assumes a
//! standard 3x4 phone pad in the lower half of the screen:
//!
//! ```text
//!   12% W      50% W      88% W
//!     1          2          3        45% H
//!     4          5          6        55% H
//!     7          8          9        65% H
//!     *          0          #        75% H
//!               CALL                 93% H
//! ```
//!
//! Rows are evenly spaced from the top of the `[45% H, 85% H]` band. The
//! generator is total: every accepted [`ScreenSize`] yields all twelve keys
//! plus `CALL`, at distinct points inside the screen.

use crate::coords::{CoordinateMap, Key, Point, ScreenSize};

/// Vertical band of the keypad, in percent of height.
const BAND_TOP_PCT: u32 = 45;
const BAND_BOTTOM_PCT: u32 = 85;

/// Outer column positions, in percent of width.
const LEFT_PCT: u32 = 12;
const RIGHT_PCT: u32 = 88;

const ROWS: u32 = 4;

/// Compute the fallback coordinate map for a screen.
#[must_use]
pub fn fallback_grid(size: ScreenSize) -> CoordinateMap {
    let top = size.percent(0, BAND_TOP_PCT).y;
    let bottom = size.percent(0, BAND_BOTTOM_PCT).y;
    let cols = [
        size.percent(LEFT_PCT, 0).x,
        size.width / 2,
        size.percent(RIGHT_PCT, 0).x,
    ];
    let rows: Vec<u32> = (0..ROWS).map(|i| top + (bottom - top) * i / ROWS).collect();

    let mut map: CoordinateMap = Key::KEYPAD
        .iter()
        .enumerate()
        .map(|(i, key)| (*key, Point::new(cols[i % 3], rows[i / 3])))
        .collect();
    map.insert(Key::Call, size.call_fallback());
    map
}
