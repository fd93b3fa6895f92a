//! Core types and logic for dialfarm.
//!
//! This crate holds everything about driving a dial pad that doesn't need a
//! device attached: parsing UI dumps, recognising keypad keys, building and
//! caching coordinate maps, deciding which devices to process, and the
//! vocabulary of session outcomes. The `dialfarm` binary supplies the
//! transport, timing and concurrency around it.
//!
//! # Modules
//!
//! - [`error`]: error types with operator-facing suggestions
//! - [`elements`]: UI elements, hierarchy parsing and key classification
//! - [`coords`]: keys, points, screen sizes, coordinate maps and cache text
//! - [`grid`]: the fallback keypad grid
//! - [`resolve`]: snapshot → coordinate map resolution
//! - [`device`]: device handles and bridge output parsers
//! - [`tracker`]: per-device dedup and cooldown bookkeeping
//! - [`outcome`]: session statuses, outcome records and totals
//!
//! # Resolution
//!
//! | Snapshot | `CALL` | Result |
//! |----------|--------|--------|
//! | 12 keypad keys | found | live map |
//! | 12 keypad keys | found by label search | live map + searched `CALL` |
//! | 12 keypad keys | missing, not required | live map, bottom-center commit |
//! | 12 keypad keys | missing, required | fallback grid |
//! | fewer than 12 / no snapshot | any | fallback grid |

pub mod coords;
pub mod device;
pub mod elements;
pub mod error;
pub mod grid;
pub mod outcome;
pub mod resolve;
pub mod tracker;
