//! UI hierarchy dumps.
//!
//! Parses the XML written by `uiautomator dump` into a flat, document-ordered
//! list of [`UiElement`]s. Only `<node>` tags are considered and only four
//! attributes are read:
//!
//! | Attribute | Field |
//! |-----------|-------|
//! | `text` | [`UiElement::text`] |
//! | `resource-id` | [`UiElement::identifier`] |
//! | `content-desc` | [`UiElement::description`] |
//! | `bounds` | [`UiElement::bounds`] |
//!
//! Nodes with missing or degenerate bounds are dropped; they can't be tapped.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::elements::{Bounds, UiElement};
use crate::error::ApiError;

/// Upper bound on dump size. Real dialer dumps are tens of kilobytes.
const MAX_DUMP_LEN: usize = 8 * 1024 * 1024;

/// A UI snapshot captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub elements: Vec<UiElement>,
    /// Hash of the raw dump, for spotting unchanged screens.
    pub content_hash: u64,
}

impl UiSnapshot {
    /// Build a snapshot from already-parsed elements (hash over their debug form).
    #[must_use]
    pub fn from_elements(elements: Vec<UiElement>) -> Self {
        let content_hash = compute_content_hash(&format!("{:?}", elements));
        Self {
            elements,
            content_hash,
        }
    }
}

fn node_regex() -> &'static Regex {
    static NODE: OnceLock<Regex> = OnceLock::new();
    NODE.get_or_init(|| Regex::new(r"<node\b([^>]*)>").expect("static regex"))
}

fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).expect("static regex"))
}

/// Parse a uiautomator XML dump.
///
/// Returns an error only when the input does not look like a hierarchy dump
/// at all. A dump with zero tappable nodes is a valid, empty snapshot.
pub fn parse_hierarchy(xml: &str) -> Result<UiSnapshot, ApiError> {
    if xml.len() > MAX_DUMP_LEN {
        return Err(ApiError::invalid_output(
            "UI hierarchy",
            &format!("{} byte dump", xml.len()),
        ));
    }
    if !xml.contains("<hierarchy") {
        return Err(ApiError::invalid_output("UI hierarchy", xml));
    }

    let mut elements = Vec::new();
    for node in node_regex().captures_iter(xml) {
        let mut text = None;
        let mut identifier = None;
        let mut description = None;
        let mut bounds = None;

        for attr in attr_regex().captures_iter(&node[1]) {
            let value = &attr[2];
            match &attr[1] {
                "text" => text = Some(decode_entities(value)),
                "resource-id" => identifier = Some(decode_entities(value)),
                "content-desc" => description = Some(decode_entities(value)),
                "bounds" => bounds = Bounds::parse(value),
                _ => {}
            }
        }

        let Some(bounds) = bounds else {
            continue;
        };
        let mut element = UiElement::new(bounds);
        if let Some(t) = text {
            element = element.with_text(t);
        }
        if let Some(id) = identifier {
            element = element.with_identifier(id);
        }
        if let Some(desc) = description {
            element = element.with_description(desc);
        }
        elements.push(element);
    }

    Ok(UiSnapshot {
        elements,
        content_hash: compute_content_hash(xml),
    })
}

/// Decode the XML entities uiautomator emits.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Compute a content hash from dump text.
///
/// Uses FNV-1a, a fast non-cryptographic hash suitable for change detection.
#[must_use]
pub fn compute_content_hash(text: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;

    let mut hash = FNV_OFFSET;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
