use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser as CmarkParser, Tag, TagEnd};

use crate::document::{ColumnAlignment, Document, DocumentNode, InlineNode};

/// Raw html lines that stand alone as block-level markers. An html block
/// opening with one of these is split so the markdown after it is parsed
/// normally instead of being swallowed into the raw block.
const BLOCK_MARKERS: &[&str] = &["<err>", "</err>"];

type Events<'a> = [(Event<'a>, Range<usize>)];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse Markdown source text into a Document.
pub fn parse_document(source: &str) -> Document {
    let parser = CmarkParser::new_ext(source, super::options());
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut i = 0;
    let nodes = collect_blocks(&events, &mut i, &|_| false);
    Document { nodes }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Collect block nodes until a matching End tag (consumed) or the end of input.
fn collect_blocks(events: &Events<'_>, i: &mut usize, is_end: &dyn Fn(&TagEnd) -> bool) -> Vec<DocumentNode> {
    let mut nodes = Vec::new();

    while *i < events.len() {
        let (ref ev, _) = events[*i];

        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }

            Event::Start(Tag::Paragraph) => {
                *i += 1;
                let inlines = collect_inlines(events, i, &|e| matches!(e, TagEnd::Paragraph));
                nodes.push(DocumentNode::Paragraph(inlines));
            }

            Event::Start(Tag::Heading { level, .. }) => {
                let level = heading_level_to_u8(level);
                *i += 1;
                let content = collect_inlines(events, i, &|e| matches!(e, TagEnd::Heading(_)));
                nodes.push(DocumentNode::Heading { level, content });
            }

            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        let lang = lang.to_string();
                        if lang.is_empty() { None } else { Some(lang) }
                    }
                    CodeBlockKind::Indented => None,
                };
                *i += 1;
                let content = collect_text_until(events, i, |e| matches!(e, TagEnd::CodeBlock));
                nodes.push(DocumentNode::CodeBlock { language, content });
            }

            Event::Start(Tag::Table(alignments)) => {
                let alignments: Vec<ColumnAlignment> = alignments
                    .iter()
                    .map(|a| match a {
                        pulldown_cmark::Alignment::None => ColumnAlignment::None,
                        pulldown_cmark::Alignment::Left => ColumnAlignment::Left,
                        pulldown_cmark::Alignment::Center => ColumnAlignment::Center,
                        pulldown_cmark::Alignment::Right => ColumnAlignment::Right,
                    })
                    .collect();
                *i += 1;
                let (headers, rows) = collect_table(events, i);
                nodes.push(DocumentNode::Table {
                    alignments,
                    headers,
                    rows,
                });
            }

            Event::Start(Tag::BlockQuote(_)) => {
                *i += 1;
                let inner = collect_blocks(events, i, &|e| matches!(e, TagEnd::BlockQuote(_)));
                nodes.push(DocumentNode::Blockquote(Document { nodes: inner }));
            }

            Event::Start(Tag::List(start)) => {
                let start = *start;
                *i += 1;
                let items = collect_list_items(events, i);
                nodes.push(match start {
                    Some(start) => DocumentNode::OrderedList { start, items },
                    None => DocumentNode::UnorderedList { items },
                });
            }

            Event::Start(Tag::HtmlBlock) => {
                *i += 1;
                let text = collect_text_until(events, i, |e| matches!(e, TagEnd::HtmlBlock));
                nodes.extend(split_html_block(text));
            }

            Event::Rule => {
                nodes.push(DocumentNode::HorizontalRule);
                *i += 1;
            }

            // Tight list items carry their inline content without a paragraph.
            _ if is_inline_start(ev) => {
                let inlines = collect_loose_inlines(events, i);
                nodes.push(DocumentNode::Paragraph(inlines));
            }

            _ => {
                *i += 1;
            }
        }
    }

    nodes
}

/// Collect list items until the end of the list. Each item becomes a Document.
fn collect_list_items(events: &Events<'_>, i: &mut usize) -> Vec<Document> {
    let mut items = Vec::new();

    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(TagEnd::List(_)) => {
                *i += 1;
                break;
            }
            Event::Start(Tag::Item) => {
                *i += 1;
                let nodes = collect_blocks(events, i, &|e| matches!(e, TagEnd::Item));
                items.push(Document { nodes });
            }
            _ => {
                *i += 1;
            }
        }
    }

    items
}

/// Turn the text of a raw html block into block nodes.
///
/// A block whose first line is a lone marker yields a paragraph holding just
/// that marker, followed by the markdown of the remaining lines.
fn split_html_block(text: String) -> Vec<DocumentNode> {
    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text.as_str(), ""),
    };
    let marker = first.trim();

    if !BLOCK_MARKERS.contains(&marker) {
        return vec![DocumentNode::RawBlock {
            format: "html".to_string(),
            text,
        }];
    }

    let mut nodes = vec![DocumentNode::Paragraph(vec![InlineNode::html(marker)])];
    if !rest.trim().is_empty() {
        nodes.extend(parse_document(rest).nodes);
    }
    nodes
}

// ---------------------------------------------------------------------------
// Inlines
// ---------------------------------------------------------------------------

fn is_inline_start(ev: &Event<'_>) -> bool {
    matches!(
        ev,
        Event::Text(_)
            | Event::Code(_)
            | Event::InlineHtml(_)
            | Event::InlineMath(_)
            | Event::DisplayMath(_)
            | Event::SoftBreak
            | Event::HardBreak
            | Event::Start(Tag::Strong)
            | Event::Start(Tag::Emphasis)
            | Event::Start(Tag::Strikethrough)
            | Event::Start(Tag::Link { .. })
            | Event::Start(Tag::Image { .. })
    )
}

/// Read one inline node at `*i`, advancing past it. Returns None (without
/// advancing) if the event does not start an inline node.
fn next_inline(events: &Events<'_>, i: &mut usize) -> Option<InlineNode> {
    let (ref ev, _) = events[*i];
    let node = match ev {
        Event::Text(s) => {
            // entities and backslash escapes split text into several events
            let mut text = s.to_string();
            *i += 1;
            while let Some((Event::Text(more), _)) = events.get(*i) {
                text.push_str(more);
                *i += 1;
            }
            InlineNode::Text(text)
        }
        Event::Code(s) => {
            *i += 1;
            InlineNode::CodeSpan(s.to_string())
        }
        Event::InlineHtml(s) => {
            *i += 1;
            InlineNode::html(s.to_string())
        }
        Event::InlineMath(s) => {
            *i += 1;
            InlineNode::Math {
                display: false,
                source: s.to_string(),
            }
        }
        Event::DisplayMath(s) => {
            *i += 1;
            InlineNode::Math {
                display: true,
                source: s.to_string(),
            }
        }
        Event::SoftBreak => {
            *i += 1;
            InlineNode::SoftBreak
        }
        Event::HardBreak => {
            *i += 1;
            InlineNode::HardBreak
        }
        Event::Start(Tag::Strong) => {
            *i += 1;
            InlineNode::Strong(collect_inlines(events, i, &|e| matches!(e, TagEnd::Strong)))
        }
        Event::Start(Tag::Emphasis) => {
            *i += 1;
            InlineNode::Emphasis(collect_inlines(events, i, &|e| matches!(e, TagEnd::Emphasis)))
        }
        Event::Start(Tag::Strikethrough) => {
            *i += 1;
            InlineNode::Strikethrough(collect_inlines(events, i, &|e| {
                matches!(e, TagEnd::Strikethrough)
            }))
        }
        Event::Start(Tag::Link { dest_url, title, .. }) => {
            let dest = dest_url.to_string();
            let title = title.to_string();
            *i += 1;
            let content = collect_inlines(events, i, &|e| matches!(e, TagEnd::Link));
            InlineNode::Link { dest, title, content }
        }
        Event::Start(Tag::Image { dest_url, title, .. }) => {
            let dest = dest_url.to_string();
            let title = title.to_string();
            *i += 1;
            let alt = collect_inlines(events, i, &|e| matches!(e, TagEnd::Image));
            InlineNode::Image { dest, title, alt }
        }
        _ => return None,
    };
    Some(node)
}

/// Collect inline nodes until a matching End tag.
fn collect_inlines(events: &Events<'_>, i: &mut usize, is_end: &dyn Fn(&TagEnd) -> bool) -> Vec<InlineNode> {
    let mut inlines = Vec::new();

    while *i < events.len() {
        if let (Event::End(tag_end), _) = &events[*i] {
            if is_end(tag_end) {
                *i += 1;
                break;
            }
        }
        match next_inline(events, i) {
            Some(node) => inlines.push(node),
            None => *i += 1,
        }
    }

    inlines
}

/// Collect a run of inline nodes that is not wrapped in a paragraph.
/// Stops (without consuming) at the first non-inline event.
fn collect_loose_inlines(events: &Events<'_>, i: &mut usize) -> Vec<InlineNode> {
    let mut inlines = Vec::new();
    while *i < events.len() {
        match next_inline(events, i) {
            Some(node) => inlines.push(node),
            None => break,
        }
    }
    inlines
}

/// Collect table headers and rows.
fn collect_table(events: &Events<'_>, i: &mut usize) -> (Vec<Vec<InlineNode>>, Vec<Vec<Vec<InlineNode>>>) {
    let mut headers: Vec<Vec<InlineNode>> = Vec::new();
    let mut rows: Vec<Vec<Vec<InlineNode>>> = Vec::new();
    let mut in_head = false;
    let mut current_row: Vec<Vec<InlineNode>> = Vec::new();

    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(TagEnd::Table) => {
                *i += 1;
                break;
            }
            Event::Start(Tag::TableHead) => {
                in_head = true;
                *i += 1;
            }
            Event::End(TagEnd::TableHead) => {
                in_head = false;
                headers = std::mem::take(&mut current_row);
                *i += 1;
            }
            Event::Start(Tag::TableRow) => {
                current_row = Vec::new();
                *i += 1;
            }
            Event::End(TagEnd::TableRow) => {
                if !in_head {
                    rows.push(std::mem::take(&mut current_row));
                }
                *i += 1;
            }
            Event::Start(Tag::TableCell) => {
                *i += 1;
                let cell = collect_inlines(events, i, &|e| matches!(e, TagEnd::TableCell));
                current_row.push(cell);
            }
            _ => {
                *i += 1;
            }
        }
    }

    (headers, rows)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Collect all text content until a matching End tag.
fn collect_text_until(events: &Events<'_>, i: &mut usize, is_end: impl Fn(&TagEnd) -> bool) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Html(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn para(inlines: Vec<InlineNode>) -> DocumentNode {
        DocumentNode::Paragraph(inlines)
    }

    #[test]
    fn inline_html_becomes_raw_fragment() {
        let doc = parse_document("see <obs author=\"A\">this</obs> now\n");
        assert_eq!(
            doc.nodes,
            vec![para(vec![
                InlineNode::text("see "),
                InlineNode::html("<obs author=\"A\">"),
                InlineNode::text("this"),
                InlineNode::html("</obs>"),
                InlineNode::text(" now"),
            ])]
        );
    }

    #[test]
    fn adjacent_text_events_are_merged() {
        let doc = parse_document("a &lt;err&gt; \\*b\\*\n");
        assert_eq!(doc.nodes, vec![para(vec![InlineNode::text("a <err> *b*")])]);
    }

    #[test]
    fn lone_marker_line_is_split_from_following_markdown() {
        let doc = parse_document("<err>\n*inside*\n\nafter\n");
        assert_eq!(
            doc.nodes,
            vec![
                para(vec![InlineNode::html("<err>")]),
                para(vec![InlineNode::Emphasis(vec![InlineNode::text("inside")])]),
                para(vec![InlineNode::text("after")]),
            ]
        );
    }

    #[test]
    fn other_html_blocks_stay_raw() {
        let doc = parse_document("<div>\nkeep\n</div>\n");
        assert_eq!(
            doc.nodes,
            vec![DocumentNode::RawBlock {
                format: "html".to_string(),
                text: "<div>\nkeep\n</div>\n".to_string(),
            }]
        );
    }

    #[test]
    fn tight_list_items_get_paragraphs() {
        let doc = parse_document("- one\n- two\n");
        assert_eq!(
            doc.nodes,
            vec![DocumentNode::UnorderedList {
                items: vec![
                    Document::new(vec![para(vec![InlineNode::text("one")])]),
                    Document::new(vec![para(vec![InlineNode::text("two")])]),
                ],
            }]
        );
    }

    #[test]
    fn math_is_kept_opaque() {
        let doc = parse_document("area $\\pi r^2$\n");
        assert_eq!(
            doc.nodes,
            vec![para(vec![
                InlineNode::text("area "),
                InlineNode::Math {
                    display: false,
                    source: "\\pi r^2".to_string(),
                },
            ])]
        );
    }

    #[test]
    fn blockquote_nests_a_document() {
        let doc = parse_document("> quoted\n");
        assert_eq!(
            doc.nodes,
            vec![DocumentNode::Blockquote(Document::new(vec![para(vec![
                InlineNode::text("quoted")
            ])]))]
        );
    }
}
