//! Lexical recognition of the tag markers.
//!
//! Markers are matched against the exact literal grammars only. Nothing here
//! parses HTML, so unrelated raw fragments can never be mistaken for a marker.

use obsmark::InlineNode;

use crate::attributes::{AttributeError, Attributes, parse_attributes};
use crate::config::WhenPrecedence;

pub const OBS_OPEN_PREFIX: &str = "<obs";
pub const OBS_CLOSE: &str = "</obs>";
pub const ERR_OPEN: &str = "<err>";
pub const ERR_CLOSE: &str = "</err>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    ObsOpen(Attributes),
    ObsClose,
    ErrOpen,
    ErrClose,
}

/// The attribute text of a fragment shaped like an `<obs ...>` open tag, or
/// None if the fragment is not shaped like one at all (`<obsidian>` is not).
pub fn obs_open_attr_text(payload: &str) -> Option<&str> {
    let inner = payload.strip_prefix(OBS_OPEN_PREFIX)?.strip_suffix('>')?;
    if inner.is_empty() || inner.starts_with(char::is_whitespace) {
        Some(inner)
    } else {
        None
    }
}

/// Parse an `<obs ...>` open tag. None if the payload is not an open tag;
/// `Some(Err(_))` if it is one with malformed attributes.
pub fn parse_obs_open(payload: &str, precedence: WhenPrecedence) -> Option<Result<Attributes, AttributeError>> {
    obs_open_attr_text(payload).map(|text| parse_attributes(text, precedence))
}

/// Classify a raw html payload.
pub fn classify_payload(payload: &str, precedence: WhenPrecedence) -> Option<Marker> {
    match payload {
        OBS_CLOSE => Some(Marker::ObsClose),
        ERR_OPEN => Some(Marker::ErrOpen),
        ERR_CLOSE => Some(Marker::ErrClose),
        _ => parse_obs_open(payload, precedence)?.ok().map(Marker::ObsOpen),
    }
}

/// Classify an inline node. Only html-tagged raw fragments can be markers.
pub fn classify(node: &InlineNode, precedence: WhenPrecedence) -> Option<Marker> {
    classify_payload(node.as_raw_html()?, precedence)
}

/// True if `node` is a raw html fragment exactly equal to `literal`.
pub fn is_literal(node: &InlineNode, literal: &str) -> bool {
    node.as_raw_html() == Some(literal)
}

/// Position of the first fragment in `inlines` exactly equal to `literal`.
pub fn find_literal(inlines: &[InlineNode], literal: &str) -> Option<usize> {
    inlines.iter().position(|node| is_literal(node, literal))
}
