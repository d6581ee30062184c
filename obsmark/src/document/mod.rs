use std::fmt;

/// A Document is a sequence of block nodes representing Markdown content.
/// Rewrite passes read one Document and build a fresh one; nodes are never
/// mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<DocumentNode>,
}

impl Document {
    pub fn new(nodes: Vec<DocumentNode>) -> Self {
        Document { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A single block in the Markdown AST.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNode {
    Paragraph(Vec<InlineNode>),
    Heading {
        level: u8,
        content: Vec<InlineNode>,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Blockquote(Document),
    Table {
        alignments: Vec<ColumnAlignment>,
        headers: Vec<Vec<InlineNode>>,
        rows: Vec<Vec<Vec<InlineNode>>>,
    },
    OrderedList {
        start: u64,
        items: Vec<Document>,
    },
    UnorderedList {
        items: Vec<Document>,
    },
    /// Raw markup block passed through to the output untouched.
    RawBlock {
        format: String,
        text: String,
    },
    /// Styled wrapper container. Only produced by rewrite passes.
    Div {
        style: String,
        body: Document,
    },

    HorizontalRule,
}

/// Inline elements that appear within a line of text.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineNode {
    Text(String),
    Space,
    /// Raw markup fragment. `format` names the markup language, e.g. `"html"`.
    Raw {
        format: String,
        text: String,
    },
    Strong(Vec<InlineNode>),
    Emphasis(Vec<InlineNode>),
    Strikethrough(Vec<InlineNode>),
    CodeSpan(String),
    Math {
        display: bool,
        source: String,
    },
    Link {
        dest: String,
        title: String,
        content: Vec<InlineNode>,
    },
    Image {
        dest: String,
        title: String,
        alt: Vec<InlineNode>,
    },
    /// Styled span. Only produced by rewrite passes.
    Span {
        style: String,
        content: Vec<InlineNode>,
    },
    SoftBreak,
    HardBreak,
}

impl InlineNode {
    pub fn text(s: impl Into<String>) -> Self {
        InlineNode::Text(s.into())
    }

    pub fn html(s: impl Into<String>) -> Self {
        InlineNode::Raw {
            format: "html".to_string(),
            text: s.into(),
        }
    }

    /// The raw payload if this is an html-tagged raw fragment.
    pub fn as_raw_html(&self) -> Option<&str> {
        match self {
            InlineNode::Raw { format, text } if format == "html" => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnAlignment {
    None,
    Left,
    Center,
    Right,
}

/// Characters that start or end inline markup anywhere in a line.
const ESCAPED: &[char] = &['\\', '`', '*', '_', '[', ']', '<', '>', '&', '#', '~', '$', '|'];

/// Backslash-escape `text` so it reads back as the same literal text.
///
/// Besides the inline markup characters, a leading `-`, `+` or `=` and the
/// `.`/`)` after leading digits are escaped, since a text node may start a
/// line. A trailing `!` is escaped so it cannot join a following link.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    for (i, c) in text.char_indices() {
        let leading = i == 0 && matches!(c, '-' | '+' | '=');
        let ordinal = digits > 0 && i == digits && matches!(c, '.' | ')');
        let bang = c == '!' && i + 1 == text.len();
        if ESCAPED.contains(&c) || leading || ordinal || bang {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A backtick fence longer than any backtick run in `code`.
fn code_fence(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest + 1)
}

fn write_destination(f: &mut fmt::Formatter<'_>, dest: &str, title: &str) -> fmt::Result {
    if dest.contains(char::is_whitespace) {
        write!(f, "(<{}>", dest)?;
    } else {
        write!(f, "({}", dest)?;
    }
    if !title.is_empty() {
        write!(f, " \"{}\"", title.replace('\\', "\\\\").replace('"', "\\\""))?;
    }
    write!(f, ")")
}

fn write_inlines(f: &mut fmt::Formatter<'_>, inlines: &[InlineNode]) -> fmt::Result {
    for inline in inlines {
        write!(f, "{}", inline)?;
    }
    Ok(())
}

/// Write `text` line by line, the first line prefixed by `first` and the rest by `rest`.
/// Blank lines only get the trimmed prefix.
fn write_indented(f: &mut fmt::Formatter<'_>, text: &str, first: &str, rest: &str) -> fmt::Result {
    for (i, line) in text.lines().enumerate() {
        let prefix = if i == 0 { first } else { rest };
        if line.is_empty() {
            writeln!(f, "{}", prefix.trim_end())?;
        } else {
            writeln!(f, "{}{}", prefix, line)?;
        }
    }
    Ok(())
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentNode::Paragraph(inlines) => {
                write_inlines(f, inlines)?;
                writeln!(f)
            }
            DocumentNode::Heading { level, content } => {
                for _ in 0..*level {
                    write!(f, "#")?;
                }
                write!(f, " ")?;
                write_inlines(f, content)?;
                writeln!(f)
            }
            DocumentNode::CodeBlock { language, content } => {
                write!(f, "```")?;
                if let Some(lang) = language {
                    write!(f, "{}", lang)?;
                }
                writeln!(f)?;
                write!(f, "{}", content)?;
                if !content.is_empty() && !content.ends_with('\n') {
                    writeln!(f)?;
                }
                writeln!(f, "```")
            }
            DocumentNode::Blockquote(doc) => write_indented(f, &doc.to_string(), "> ", "> "),
            DocumentNode::Table {
                alignments,
                headers,
                rows,
            } => {
                write!(f, "|")?;
                for header in headers {
                    write!(f, " ")?;
                    write_inlines(f, header)?;
                    write!(f, " |")?;
                }
                writeln!(f)?;
                write!(f, "|")?;
                for i in 0..headers.len() {
                    let rule = match alignments.get(i).copied().unwrap_or(ColumnAlignment::None) {
                        ColumnAlignment::None => "---",
                        ColumnAlignment::Left => ":--",
                        ColumnAlignment::Center => ":-:",
                        ColumnAlignment::Right => "--:",
                    };
                    write!(f, "{}|", rule)?;
                }
                writeln!(f)?;
                for row in rows {
                    write!(f, "|")?;
                    for cell in row {
                        write!(f, " ")?;
                        write_inlines(f, cell)?;
                        write!(f, " |")?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            DocumentNode::OrderedList { start, items } => {
                for (i, item) in items.iter().enumerate() {
                    let marker = format!("{}. ", *start as usize + i);
                    let pad = " ".repeat(marker.len());
                    write_indented(f, &item.to_string(), &marker, &pad)?;
                }
                Ok(())
            }
            DocumentNode::UnorderedList { items } => {
                for item in items {
                    write_indented(f, &item.to_string(), "- ", "  ")?;
                }
                Ok(())
            }
            DocumentNode::RawBlock { text, .. } => {
                write!(f, "{}", text)?;
                if !text.ends_with('\n') {
                    writeln!(f)?;
                }
                Ok(())
            }
            DocumentNode::Div { style, body } => {
                writeln!(f, "<div style=\"{}\">", style)?;
                writeln!(f)?;
                write!(f, "{}", body)?;
                if !body.is_empty() {
                    writeln!(f)?;
                }
                writeln!(f, "</div>")
            }
            DocumentNode::HorizontalRule => writeln!(f, "---"),
        }
    }
}

impl fmt::Display for InlineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineNode::Text(s) => write!(f, "{}", escape_text(s)),
            InlineNode::Space => write!(f, " "),
            InlineNode::Raw { text, .. } => write!(f, "{}", text),
            InlineNode::Strong(children) => {
                write!(f, "**")?;
                write_inlines(f, children)?;
                write!(f, "**")
            }
            InlineNode::Emphasis(children) => {
                write!(f, "*")?;
                write_inlines(f, children)?;
                write!(f, "*")
            }
            InlineNode::Strikethrough(children) => {
                write!(f, "~~")?;
                write_inlines(f, children)?;
                write!(f, "~~")
            }
            InlineNode::CodeSpan(code) => {
                let fence = code_fence(code);
                if code.starts_with('`') || code.ends_with('`') {
                    write!(f, "{} {} {}", fence, code, fence)
                } else {
                    write!(f, "{}{}{}", fence, code, fence)
                }
            }
            InlineNode::Math { display, source } => {
                let fence = if *display { "$$" } else { "$" };
                write!(f, "{}{}{}", fence, source, fence)
            }
            InlineNode::Link { dest, title, content } => {
                write!(f, "[")?;
                write_inlines(f, content)?;
                write!(f, "]")?;
                write_destination(f, dest, title)
            }
            InlineNode::Image { dest, title, alt } => {
                write!(f, "![")?;
                write_inlines(f, alt)?;
                write!(f, "]")?;
                write_destination(f, dest, title)
            }
            InlineNode::Span { style, content } => {
                write!(f, "<span style=\"{}\">", style)?;
                write_inlines(f, content)?;
                write!(f, "</span>")
            }
            InlineNode::SoftBreak => writeln!(f),
            InlineNode::HardBreak => write!(f, "\\\n"),
        }
    }
}
