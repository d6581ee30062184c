use log::debug;
use obsmark::{Document, DocumentNode, InlineNode};

use crate::block::rewrite_blocks;
use crate::config::RewriteConfig;
use crate::inline::rewrite_inlines;

/// Rewrite all markers in a document.
///
/// Every inline run is rewritten first, innermost runs before the runs that
/// contain them. Every block sequence is then rewritten, nested sequences
/// (blockquotes, list items, containers) before their parents. Each run and
/// each sequence is its own scanning context.
pub fn rewrite_document(doc: &Document, config: &RewriteConfig) -> Document {
    let nodes = rewrite_sequence(&doc.nodes, config);
    debug!("rewrote document: {} block(s) in, {} out", doc.nodes.len(), nodes.len());
    Document { nodes }
}

fn rewrite_sequence(blocks: &[DocumentNode], config: &RewriteConfig) -> Vec<DocumentNode> {
    let inner: Vec<DocumentNode> = blocks.iter().map(|block| rewrite_block(block, config)).collect();
    rewrite_blocks(&inner, config)
}

fn rewrite_items(items: &[Document], config: &RewriteConfig) -> Vec<Document> {
    items
        .iter()
        .map(|item| Document::new(rewrite_sequence(&item.nodes, config)))
        .collect()
}

fn rewrite_block(block: &DocumentNode, config: &RewriteConfig) -> DocumentNode {
    match block {
        DocumentNode::Paragraph(inlines) => DocumentNode::Paragraph(rewrite_run(inlines, config)),
        DocumentNode::Heading { level, content } => DocumentNode::Heading {
            level: *level,
            content: rewrite_run(content, config),
        },
        DocumentNode::Blockquote(doc) => {
            DocumentNode::Blockquote(Document::new(rewrite_sequence(&doc.nodes, config)))
        }
        DocumentNode::Table {
            alignments,
            headers,
            rows,
        } => DocumentNode::Table {
            alignments: alignments.clone(),
            headers: headers.iter().map(|cell| rewrite_run(cell, config)).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| rewrite_run(cell, config)).collect())
                .collect(),
        },
        DocumentNode::OrderedList { start, items } => DocumentNode::OrderedList {
            start: *start,
            items: rewrite_items(items, config),
        },
        DocumentNode::UnorderedList { items } => DocumentNode::UnorderedList {
            items: rewrite_items(items, config),
        },
        DocumentNode::Div { style, body } => DocumentNode::Div {
            style: style.clone(),
            body: Document::new(rewrite_sequence(&body.nodes, config)),
        },
        DocumentNode::CodeBlock { .. } | DocumentNode::RawBlock { .. } | DocumentNode::HorizontalRule => {
            block.clone()
        }
    }
}

/// Rewrite the runs nested in each node, then the run itself.
fn rewrite_run(inlines: &[InlineNode], config: &RewriteConfig) -> Vec<InlineNode> {
    let inner: Vec<InlineNode> = inlines.iter().map(|node| rewrite_children(node, config)).collect();
    rewrite_inlines(&inner, config)
}

fn rewrite_children(node: &InlineNode, config: &RewriteConfig) -> InlineNode {
    match node {
        InlineNode::Strong(children) => InlineNode::Strong(rewrite_run(children, config)),
        InlineNode::Emphasis(children) => InlineNode::Emphasis(rewrite_run(children, config)),
        InlineNode::Strikethrough(children) => InlineNode::Strikethrough(rewrite_run(children, config)),
        InlineNode::Link { dest, title, content } => InlineNode::Link {
            dest: dest.clone(),
            title: title.clone(),
            content: rewrite_run(content, config),
        },
        InlineNode::Image { dest, title, alt } => InlineNode::Image {
            dest: dest.clone(),
            title: title.clone(),
            alt: rewrite_run(alt, config),
        },
        InlineNode::Span { style, content } => InlineNode::Span {
            style: style.clone(),
            content: rewrite_run(content, config),
        },
        InlineNode::Text(_)
        | InlineNode::Space
        | InlineNode::Raw { .. }
        | InlineNode::CodeSpan(_)
        | InlineNode::Math { .. }
        | InlineNode::SoftBreak
        | InlineNode::HardBreak => node.clone(),
    }
}
