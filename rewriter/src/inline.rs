use log::{debug, trace};
use obsmark::InlineNode;

use crate::attributes::Attributes;
use crate::config::{RewriteConfig, Styles};
use crate::marker::{self, Marker, OBS_CLOSE};

/// Rewrite every matched `<obs ...>...</obs>` scope in one run of inline nodes.
///
/// An open tag is closed by the first `</obs>` after it; annotations do not
/// nest. An open tag with no close in the run is left as literal content
/// together with everything after it. All other nodes pass through unchanged.
pub fn rewrite_inlines(inlines: &[InlineNode], config: &RewriteConfig) -> Vec<InlineNode> {
    let mut out = Vec::with_capacity(inlines.len());
    let mut cursor = 0;

    while cursor < inlines.len() {
        let node = &inlines[cursor];
        let Some(Marker::ObsOpen(attrs)) = marker::classify(node, config.when_precedence) else {
            out.push(node.clone());
            cursor += 1;
            continue;
        };

        let body_start = cursor + 1;
        match marker::find_literal(&inlines[body_start..], OBS_CLOSE) {
            Some(len) => {
                let close = body_start + len;
                trace!("annotation scope over {} node(s)", len);
                out.extend(annotation(&attrs, &inlines[body_start..close], &config.styles));
                cursor = close + 1;
            }
            None => {
                debug!("unclosed `{}` left as literal text", node);
                out.extend_from_slice(&inlines[cursor..]);
                break;
            }
        }
    }

    out
}

/// Build the replacement for one annotation: an optional prefix span and a
/// separating space, then the content span holding `body` verbatim.
fn annotation(attrs: &Attributes, body: &[InlineNode], styles: &Styles) -> Vec<InlineNode> {
    let mut out = Vec::with_capacity(3);
    if let Some(prefix) = attrs.prefix_text() {
        out.push(InlineNode::Span {
            style: styles.annotation_prefix.clone(),
            content: vec![InlineNode::Text(prefix)],
        });
        out.push(InlineNode::Space);
    }
    out.push(InlineNode::Span {
        style: styles.annotation_body.clone(),
        content: body.to_vec(),
    });
    out
}
