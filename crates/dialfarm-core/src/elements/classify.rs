//! Classification: mapping UI elements to logical keypad keys.
//!
//! Each element is run through an ordered list of matcher strategies; the
//! first strategy that produces a key wins. Elements no strategy recognises
//! are ignored.
//!
//! # Strategy Priority (highest to lowest)
//!
//! 1. **Exact text**: trimmed `text` is one of `0-9`, `*`, `#`
//! 2. **Character scan**: `identifier` or `description` contains a keypad
//!    character; alphabet order decides between several
//! 3. **Token map**: `identifier` or `description` contains a spelled-out
//!    label such as `seven`, `star`, `pound` or `call` (case-insensitive,
//!    leftmost occurrence wins)
//!
//! Labels live in [`KEY_LABELS`], so supporting another dialer's naming is a
//! table edit, not new branching.

use crate::coords::Key;
use crate::elements::UiElement;

// ============================================================================
// Label Tables
// ============================================================================

/// Keypad characters in scan order for the character-scan strategy.
const KEYPAD_ALPHABET: &str = "0123456789*#";

/// Spelled-out labels per key, matched as lowercase substrings.
pub const KEY_LABELS: &[(Key, &[&str])] = &[
    (Key::Digit(0), &["zero"]),
    (Key::Digit(1), &["one"]),
    (Key::Digit(2), &["two"]),
    (Key::Digit(3), &["three"]),
    (Key::Digit(4), &["four"]),
    (Key::Digit(5), &["five"]),
    (Key::Digit(6), &["six"]),
    (Key::Digit(7), &["seven"]),
    (Key::Digit(8), &["eight"]),
    (Key::Digit(9), &["nine"]),
    (Key::Star, &["star"]),
    (Key::Pound, &["pound", "hash"]),
    (Key::Call, &["call"]),
];

/// Words that mark a call/commit button when searched across any attribute.
pub const CALL_HINTS: &[&str] = &["call", "dial", "dialer", "phone", "endcall"];

/// Identifier fragments of a "show keypad" toggle.
const KEYPAD_TOGGLE_IDS: &[&str] = &["dialpad", "keypad", "show_dialpad", "show_dialer"];

/// Description fragments of a "show keypad" toggle.
const KEYPAD_TOGGLE_DESCS: &[&str] = &["dialpad", "keypad", "show dialpad"];

// ============================================================================
// Strategies
// ============================================================================

/// One way of recognising a key on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    ExactText,
    CharacterScan,
    TokenMap,
}

impl Matcher {
    /// Strategies in evaluation order.
    pub const PRIORITY: [Matcher; 3] = [
        Matcher::ExactText,
        Matcher::CharacterScan,
        Matcher::TokenMap,
    ];

    /// Try this strategy on one element.
    #[must_use]
    pub fn apply(self, element: &UiElement) -> Option<Key> {
        match self {
            Matcher::ExactText => {
                let text = element.text.as_deref()?.trim();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::from_char(c),
                    _ => None,
                }
            }
            Matcher::CharacterScan => {
                let haystacks = labels(element);
                KEYPAD_ALPHABET
                    .chars()
                    .find(|c| haystacks.iter().any(|h| h.contains(*c)))
                    .and_then(Key::from_char)
            }
            Matcher::TokenMap => {
                let haystack = labels(element).join(" ").to_lowercase();
                KEY_LABELS
                    .iter()
                    .flat_map(|(key, names)| {
                        names
                            .iter()
                            .filter_map(|name| haystack.find(name).map(|pos| (pos, *key)))
                    })
                    .min_by_key(|(pos, key)| (*pos, *key))
                    .map(|(_, key)| key)
            }
        }
    }
}

/// Identifier and description, whichever are present.
fn labels(element: &UiElement) -> Vec<&str> {
    [element.identifier.as_deref(), element.description.as_deref()]
        .into_iter()
        .flatten()
        .collect()
}

/// Classify an element as a logical key, first matching strategy wins.
#[must_use]
pub fn classify(element: &UiElement) -> Option<Key> {
    Matcher::PRIORITY.iter().find_map(|m| m.apply(element))
}

/// First element whose identifier, description or text hints at a call button.
///
/// Used as a second pass when the keypad resolved but no element classified
/// as `CALL`.
#[must_use]
pub fn find_call_candidate(elements: &[UiElement]) -> Option<&UiElement> {
    elements.iter().find(|e| {
        let haystack = [
            e.identifier.as_deref(),
            e.description.as_deref(),
            e.text.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
        CALL_HINTS.iter().any(|hint| haystack.contains(hint))
    })
}

/// First element that looks like a button revealing a hidden keypad.
#[must_use]
pub fn find_keypad_toggle(elements: &[UiElement]) -> Option<&UiElement> {
    elements.iter().find(|e| {
        let id = e.identifier.as_deref().unwrap_or_default().to_lowercase();
        let desc = e.description.as_deref().unwrap_or_default().to_lowercase();
        KEYPAD_TOGGLE_IDS.iter().any(|k| id.contains(k))
            || KEYPAD_TOGGLE_DESCS.iter().any(|k| desc.contains(k))
    })
}
