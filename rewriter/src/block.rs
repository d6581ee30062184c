//! Debug-scope reconstruction over a sequence of blocks.
//!
//! `<err>` and `</err>` markers sit inside paragraphs, but the scope between
//! them may run across any number of blocks. The rewriter is a two-state
//! machine fed one block at a time: while `Outside` blocks pass through, while
//! `InScope` they are collected into the open scope's accumulator. Closing a
//! scope emits a single container in place of everything it collected.

use log::debug;
use obsmark::{Document, DocumentNode, InlineNode};

use crate::config::{RewriteConfig, Styles, UnclosedDebug};
use crate::marker::{self, ERR_CLOSE, ERR_OPEN};

/// Pending content of an open `<err>` scope.
#[derive(Debug)]
struct ScopeAccumulator {
    /// Inlines before the open marker in the opening paragraph.
    lead: Vec<InlineNode>,
    /// The open marker itself.
    marker: InlineNode,
    /// Inlines after the open marker in the opening paragraph.
    tail: Vec<InlineNode>,
    /// Whole blocks collected after the opening paragraph.
    body: Vec<DocumentNode>,
}

impl ScopeAccumulator {
    fn open(lead: &[InlineNode], marker: &InlineNode, tail: &[InlineNode]) -> Self {
        ScopeAccumulator {
            lead: lead.to_vec(),
            marker: marker.clone(),
            tail: tail.to_vec(),
            body: Vec::new(),
        }
    }

    /// The content of the scope, ending with the inlines before the close marker.
    fn into_body(self, last: &[InlineNode]) -> Vec<DocumentNode> {
        let mut nodes = Vec::with_capacity(self.body.len() + 2);
        let tail = trim_breaks(&self.tail);
        if !tail.is_empty() {
            nodes.push(DocumentNode::Paragraph(tail.to_vec()));
        }
        nodes.extend(self.body);
        let last = trim_breaks(last);
        if !last.is_empty() {
            nodes.push(DocumentNode::Paragraph(last.to_vec()));
        }
        nodes
    }

    /// Everything the scope consumed, as it appeared in the input.
    fn into_literal(self) -> Vec<DocumentNode> {
        let mut opening = self.lead;
        opening.push(self.marker);
        opening.extend(self.tail);

        let mut nodes = Vec::with_capacity(self.body.len() + 1);
        nodes.push(DocumentNode::Paragraph(opening));
        nodes.extend(self.body);
        nodes
    }
}

#[derive(Debug)]
enum State {
    Outside,
    InScope(ScopeAccumulator),
}

/// Streaming block rewriter. Push blocks in document order, then `finish`.
pub struct BlockRewriter<'c> {
    config: &'c RewriteConfig,
    state: State,
    output: Vec<DocumentNode>,
}

impl<'c> BlockRewriter<'c> {
    pub fn new(config: &'c RewriteConfig) -> Self {
        BlockRewriter {
            config,
            state: State::Outside,
            output: Vec::new(),
        }
    }

    pub fn in_scope(&self) -> bool {
        matches!(self.state, State::InScope(_))
    }

    pub fn push(&mut self, block: &DocumentNode) {
        if let DocumentNode::Paragraph(inlines) = block {
            self.scan_paragraph(inlines);
            return;
        }
        match &mut self.state {
            State::Outside => self.output.push(block.clone()),
            State::InScope(acc) => acc.body.push(block.clone()),
        }
    }

    /// Scan one paragraph for markers. A paragraph without markers is emitted
    /// (or collected) whole; otherwise it is split at each marker and the
    /// fragments after a close marker are scanned again.
    fn scan_paragraph(&mut self, inlines: &[InlineNode]) {
        let mut rest = inlines;
        let mut whole = true;

        loop {
            match std::mem::replace(&mut self.state, State::Outside) {
                State::Outside => {
                    let Some(open) = marker::find_literal(rest, ERR_OPEN) else {
                        if whole || !rest.is_empty() {
                            self.output.push(DocumentNode::Paragraph(rest.to_vec()));
                        }
                        return;
                    };
                    let after = &rest[open + 1..];
                    match marker::find_literal(after, ERR_CLOSE) {
                        Some(close) => {
                            let acc = ScopeAccumulator::open(&rest[..open], &rest[open], &after[..close]);
                            self.close_scope(acc, &[]);
                            rest = trim_breaks(&after[close + 1..]);
                            whole = false;
                        }
                        None => {
                            debug!("debug scope opened");
                            self.state = State::InScope(ScopeAccumulator::open(&rest[..open], &rest[open], after));
                            return;
                        }
                    }
                }
                State::InScope(mut acc) => match marker::find_literal(rest, ERR_CLOSE) {
                    Some(close) => {
                        self.close_scope(acc, &rest[..close]);
                        rest = trim_breaks(&rest[close + 1..]);
                        whole = false;
                    }
                    None => {
                        acc.body.push(DocumentNode::Paragraph(rest.to_vec()));
                        self.state = State::InScope(acc);
                        return;
                    }
                },
            }
        }
    }

    fn close_scope(&mut self, mut acc: ScopeAccumulator, last: &[InlineNode]) {
        let lead = std::mem::take(&mut acc.lead);
        self.push_lead(&lead);
        let body = acc.into_body(last);
        debug!("debug scope closed over {} block(s)", body.len());
        self.output.push(debug_container(body, &self.config.styles));
    }

    /// Emit the inlines before an open marker as their own paragraph.
    fn push_lead(&mut self, lead: &[InlineNode]) {
        let lead = trim_breaks(lead);
        if !lead.is_empty() {
            self.output.push(DocumentNode::Paragraph(lead.to_vec()));
        }
    }

    pub fn finish(mut self) -> Vec<DocumentNode> {
        if let State::InScope(acc) = std::mem::replace(&mut self.state, State::Outside) {
            match self.config.unclosed_debug {
                UnclosedDebug::Discard => {
                    debug!(
                        "unclosed debug scope discarded ({} block(s) dropped)",
                        acc.body.len() + usize::from(!acc.tail.is_empty())
                    );
                    self.push_lead(&acc.lead);
                }
                UnclosedDebug::Literal => {
                    debug!("unclosed debug scope left as literal content");
                    self.output.extend(acc.into_literal());
                }
            }
        }
        self.output
    }
}

/// Rewrite every `<err>...</err>` scope in one block sequence.
pub fn rewrite_blocks(blocks: &[DocumentNode], config: &RewriteConfig) -> Vec<DocumentNode> {
    let mut rewriter = BlockRewriter::new(config);
    for block in blocks {
        rewriter.push(block);
    }
    rewriter.finish()
}

/// Strip line breaks left at the edges of a paragraph fragment.
fn trim_breaks(inlines: &[InlineNode]) -> &[InlineNode] {
    let is_break = |node: &InlineNode| matches!(node, InlineNode::SoftBreak | InlineNode::HardBreak);
    let start = inlines.iter().position(|n| !is_break(n)).unwrap_or(inlines.len());
    let end = inlines.iter().rposition(|n| !is_break(n)).map_or(start, |i| i + 1);
    &inlines[start..end]
}

/// Outer container holding the header label and the body container.
fn debug_container(body: Vec<DocumentNode>, styles: &Styles) -> DocumentNode {
    let header = DocumentNode::Paragraph(vec![InlineNode::Span {
        style: styles.debug_label_style.clone(),
        content: vec![InlineNode::Text(styles.debug_label.clone())],
    }]);
    DocumentNode::Div {
        style: styles.debug_outer.clone(),
        body: Document::new(vec![
            header,
            DocumentNode::Div {
                style: styles.debug_body.clone(),
                body: Document::new(body),
            },
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> InlineNode {
        InlineNode::text(s)
    }

    fn html(s: &str) -> InlineNode {
        InlineNode::html(s)
    }

    fn para(inlines: Vec<InlineNode>) -> DocumentNode {
        DocumentNode::Paragraph(inlines)
    }

    fn container(body: Vec<DocumentNode>) -> DocumentNode {
        debug_container(body, &Styles::default())
    }

    fn rewrite(blocks: &[DocumentNode]) -> Vec<DocumentNode> {
        rewrite_blocks(blocks, &RewriteConfig::default())
    }

    #[test]
    fn scope_across_three_paragraphs() {
        let input = vec![
            para(vec![text("before "), html("<err>")]),
            para(vec![text("middle")]),
            para(vec![html("</err>"), text(" after")]),
        ];
        assert_eq!(
            rewrite(&input),
            vec![
                para(vec![text("before ")]),
                container(vec![para(vec![text("middle")])]),
                para(vec![text(" after")]),
            ]
        );
    }

    #[test]
    fn scope_inside_one_paragraph() {
        let input = vec![para(vec![
            text("a "),
            html("<err>"),
            text("b"),
            html("</err>"),
            text(" c"),
        ])];
        assert_eq!(
            rewrite(&input),
            vec![
                para(vec![text("a ")]),
                container(vec![para(vec![text("b")])]),
                para(vec![text(" c")]),
            ]
        );
    }

    #[test]
    fn remainder_after_close_is_scanned_again() {
        let input = vec![para(vec![
            html("<err>"),
            text("one"),
            html("</err>"),
            text(" mid "),
            html("<err>"),
            text("two"),
            html("</err>"),
        ])];
        assert_eq!(
            rewrite(&input),
            vec![
                container(vec![para(vec![text("one")])]),
                para(vec![text(" mid ")]),
                container(vec![para(vec![text("two")])]),
            ]
        );
    }

    #[test]
    fn line_breaks_at_marker_edges_are_dropped() {
        let input = vec![
            para(vec![text("lead"), InlineNode::SoftBreak, html("<err>")]),
            para(vec![
                text("inside"),
                InlineNode::SoftBreak,
                html("</err>"),
                InlineNode::SoftBreak,
                text("after"),
            ]),
        ];
        assert_eq!(
            rewrite(&input),
            vec![
                para(vec![text("lead")]),
                container(vec![para(vec![text("inside")])]),
                para(vec![text("after")]),
            ]
        );
    }

    #[test]
    fn breaks_inside_fragments_are_kept() {
        let input = vec![para(vec![
            html("<err>"),
            InlineNode::SoftBreak,
            text("a"),
            InlineNode::SoftBreak,
            text("b"),
            html("</err>"),
        ])];
        assert_eq!(
            rewrite(&input),
            vec![container(vec![para(vec![text("a"), InlineNode::SoftBreak, text("b")])])]
        );
    }

    #[test]
    fn opaque_blocks_are_collected_in_scope() {
        let code = DocumentNode::CodeBlock {
            language: Some("rust".to_string()),
            content: "fn main() {}\n".to_string(),
        };
        let input = vec![
            para(vec![html("<err>")]),
            code.clone(),
            DocumentNode::HorizontalRule,
            para(vec![html("</err>")]),
            DocumentNode::HorizontalRule,
        ];
        assert_eq!(
            rewrite(&input),
            vec![
                container(vec![code, DocumentNode::HorizontalRule]),
                DocumentNode::HorizontalRule,
            ]
        );
    }

    #[test]
    fn nested_open_is_plain_content() {
        let input = vec![
            para(vec![html("<err>")]),
            para(vec![text("x "), html("<err>"), text(" y")]),
            para(vec![html("</err>")]),
            para(vec![html("</err>")]),
        ];
        assert_eq!(
            rewrite(&input),
            vec![
                container(vec![para(vec![text("x "), html("<err>"), text(" y")])]),
                para(vec![html("</err>")]),
            ]
        );
    }

    #[test]
    fn orphan_close_is_inert() {
        let input = vec![para(vec![text("x"), html("</err>")])];
        assert_eq!(rewrite(&input), input);
    }

    #[test]
    fn unclosed_scope_is_discarded_by_default() {
        let input = vec![
            para(vec![text("kept "), html("<err>"), text("orphaned")]),
            para(vec![text("also dropped")]),
        ];
        assert_eq!(rewrite(&input), vec![para(vec![text("kept ")])]);
    }

    #[test]
    fn unclosed_scope_without_lead_leaves_nothing() {
        let input = vec![para(vec![html("<err>"), text("orphaned")])];
        assert_eq!(rewrite(&input), Vec::<DocumentNode>::new());
    }

    #[test]
    fn unclosed_scope_can_be_kept_literal() {
        let config = RewriteConfig {
            unclosed_debug: UnclosedDebug::Literal,
            ..RewriteConfig::default()
        };
        let input = vec![
            para(vec![text("kept "), html("<err>"), text("orphaned")]),
            DocumentNode::HorizontalRule,
            para(vec![text("tail")]),
        ];
        assert_eq!(rewrite_blocks(&input, &config), input);
    }

    #[test]
    fn empty_scope_gives_empty_body() {
        let input = vec![para(vec![html("<err>"), html("</err>")])];
        assert_eq!(rewrite(&input), vec![container(vec![])]);
    }

    #[test]
    fn streaming_reports_scope_state() {
        let config = RewriteConfig::default();
        let mut rewriter = BlockRewriter::new(&config);
        assert!(!rewriter.in_scope());
        rewriter.push(&para(vec![html("<err>")]));
        assert!(rewriter.in_scope());
        rewriter.push(&para(vec![html("</err>")]));
        assert!(!rewriter.in_scope());
        assert_eq!(rewriter.finish(), vec![container(vec![])]);
    }

    #[test]
    fn container_layout_uses_style_table() {
        let styles = Styles::default();
        let DocumentNode::Div { style, body } = container(vec![para(vec![text("b")])]) else {
            panic!("expected an outer div");
        };
        assert_eq!(style, Styles::DEBUG_OUTER);
        assert_eq!(
            body.nodes,
            vec![
                para(vec![InlineNode::Span {
                    style: "color:grey;".to_string(),
                    content: vec![text("DEBUG:")],
                }]),
                DocumentNode::Div {
                    style: styles.debug_body.clone(),
                    body: Document::new(vec![para(vec![text("b")])]),
                },
            ]
        );
    }
}
