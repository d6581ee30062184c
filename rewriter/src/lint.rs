//! Source-level report of markers the rewriters will leave as literal text.
//!
//! The rewriters themselves never fail; this pass walks the markdown event
//! stream with byte offsets and explains each degradation at its location.

use std::ops::Range;

use obsmark::Diagnostic;
use pulldown_cmark::{Event, Parser as CmarkParser, Tag, TagEnd};

use crate::config::{RewriteConfig, UnclosedDebug};
use crate::marker::{self, ERR_CLOSE, ERR_OPEN, Marker};

/// The innermost open tag: one inline run.
struct Run {
    pending_obs: Option<Range<usize>>,
    /// `<err>`/`</err>` seen while an `<obs>` is open. They end up inside the
    /// annotation if it closes, and count as block markers if it does not.
    held_err: Vec<(bool, Range<usize>)>,
    /// Whether `<err>` markers in this run reach the block rewriter.
    accepts_err: bool,
}

struct Linter<'c> {
    file_id: usize,
    config: &'c RewriteConfig,
    runs: Vec<Run>,
    /// Open `<err>` per block sequence; the first entry is the document itself.
    scopes: Vec<Option<Range<usize>>>,
    diagnostics: Vec<Diagnostic>,
}

/// Report every marker in `source` that will not be rewritten.
pub fn check_markers(source: &str, file_id: usize, config: &RewriteConfig) -> Vec<Diagnostic> {
    let mut linter = Linter {
        file_id,
        config,
        runs: Vec::new(),
        scopes: vec![None],
        diagnostics: Vec::new(),
    };
    linter.scan(source, 0);
    while let Some(scope) = linter.scopes.pop() {
        linter.report_unclosed_err(scope);
    }

    let mut diagnostics = linter.diagnostics;
    diagnostics.sort_by_key(|d| d.span.start);
    diagnostics
}

impl Linter<'_> {
    fn scan(&mut self, text: &str, base: usize) {
        let events: Vec<(Event<'_>, Range<usize>)> =
            CmarkParser::new_ext(text, obsmark::parser::options()).into_offset_iter().collect();

        let mut i = 0;
        while i < events.len() {
            let (ref ev, ref range) = events[i];
            let span = base + range.start..base + range.end;

            match ev {
                Event::Start(Tag::HtmlBlock) => {
                    let mut html = String::new();
                    i += 1;
                    while i < events.len() {
                        match &events[i].0 {
                            Event::Html(s) => html.push_str(s),
                            Event::End(TagEnd::HtmlBlock) => break,
                            _ => {}
                        }
                        i += 1;
                    }
                    self.html_block(&html, span.start);
                }
                Event::Start(tag) => {
                    if matches!(tag, Tag::BlockQuote(_) | Tag::Item) {
                        self.scopes.push(None);
                    }
                    self.runs.push(Run {
                        pending_obs: None,
                        held_err: Vec::new(),
                        accepts_err: matches!(tag, Tag::Paragraph | Tag::Item),
                    });
                }
                Event::End(tag_end) => {
                    if let Some(run) = self.runs.pop() {
                        self.close_run(run);
                    }
                    if matches!(tag_end, TagEnd::BlockQuote(_) | TagEnd::Item) {
                        if let Some(scope) = self.scopes.pop() {
                            self.report_unclosed_err(scope);
                        }
                    }
                }
                Event::InlineHtml(payload) => self.inline_marker(payload, span),
                _ => {}
            }
            i += 1;
        }
    }

    /// A raw html block starting with a lone `<err>`/`</err>` line acts as a
    /// marker paragraph; the lines after it are ordinary markdown.
    fn html_block(&mut self, html: &str, start: usize) {
        let (first, rest) = match html.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (html, None),
        };
        let text = first.trim();
        if text != ERR_OPEN && text != ERR_CLOSE {
            return;
        }

        let offset = start + first.find(text).unwrap_or(0);
        self.err_marker(text == ERR_OPEN, offset..offset + text.len());

        if let Some(rest) = rest.filter(|r| !r.trim().is_empty()) {
            self.scan(rest, start + first.len() + 1);
        }
    }

    fn inline_marker(&mut self, payload: &str, span: Range<usize>) {
        let precedence = self.config.when_precedence;
        if let Some(Err(err)) = marker::parse_obs_open(payload, precedence) {
            self.warn(
                format!("malformed `<obs>` tag: {}", err),
                span,
                "the tag is left as literal text",
            );
            return;
        }

        match marker::classify_payload(payload, precedence) {
            Some(Marker::ObsOpen(_)) => {
                if let Some(run) = self.runs.last_mut() {
                    run.pending_obs.get_or_insert(span);
                }
            }
            Some(Marker::ObsClose) => {
                let matched = self.runs.last_mut().and_then(|run| {
                    run.held_err.clear();
                    run.pending_obs.take()
                });
                if matched.is_none() {
                    self.warn(
                        "`</obs>` without a matching `<obs>`",
                        span,
                        "the tag is left as literal text",
                    );
                }
            }
            Some(Marker::ErrOpen) if self.accepts_err() => self.run_err_marker(true, span),
            Some(Marker::ErrClose) if self.accepts_err() => self.run_err_marker(false, span),
            _ => {}
        }
    }

    fn run_err_marker(&mut self, open: bool, span: Range<usize>) {
        match self.runs.last_mut() {
            Some(run) if run.pending_obs.is_some() => run.held_err.push((open, span)),
            _ => self.err_marker(open, span),
        }
    }

    fn accepts_err(&self) -> bool {
        self.runs.last().is_none_or(|run| run.accepts_err)
    }

    fn err_marker(&mut self, open: bool, span: Range<usize>) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if open {
            if scope.is_some() {
                self.warn(
                    "nested `<err>` inside an open debug block",
                    span,
                    "debug blocks do not nest; the tag is kept as content of the outer block",
                );
            } else {
                *scope = Some(span);
            }
        } else if scope.take().is_none() {
            self.warn(
                "`</err>` without a matching `<err>`",
                span,
                "the tag is left as literal text",
            );
        }
    }

    fn close_run(&mut self, run: Run) {
        if let Some(span) = run.pending_obs {
            self.warn(
                "`<obs>` is never closed",
                span,
                "an annotation must close within the same run of text; the tag and the text after it are left as literal text",
            );
        }
        for (open, span) in run.held_err {
            self.err_marker(open, span);
        }
    }

    fn report_unclosed_err(&mut self, scope: Option<Range<usize>>) {
        let Some(span) = scope else {
            return;
        };
        let note = match self.config.unclosed_debug {
            UnclosedDebug::Discard => "the debug block and its content are dropped from the output",
            UnclosedDebug::Literal => "the tag and the content after it are left as they are",
        };
        self.warn("`<err>` is never closed", span, note);
    }

    fn warn(&mut self, message: impl Into<String>, span: Range<usize>, note: &str) {
        self.diagnostics
            .push(Diagnostic::warning(message, span, self.file_id).with_note(note));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(source: &str) -> Vec<String> {
        check_markers(source, 0, &RewriteConfig::default())
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn balanced_markers_are_clean() {
        let src = "a <obs author=\"A\">b</obs> c\n\nbefore <err>\n\nmiddle\n\n</err> after\n";
        assert!(messages(src).is_empty());
    }

    #[test]
    fn orphan_obs_close() {
        assert_eq!(messages("x </obs>\n"), vec!["`</obs>` without a matching `<obs>`"]);
    }

    #[test]
    fn unclosed_obs_is_reported_at_the_open_tag() {
        let src = "x <obs>never\n";
        let diags = check_markers(src, 0, &RewriteConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "`<obs>` is never closed");
        assert_eq!(&src[diags[0].span.clone()], "<obs>");
    }

    #[test]
    fn obs_does_not_cross_paragraphs() {
        assert_eq!(
            messages("a <obs>b\n\nc</obs>\n"),
            vec!["`<obs>` is never closed", "`</obs>` without a matching `<obs>`"]
        );
    }

    #[test]
    fn malformed_attributes() {
        let msgs = messages("x <obs who=\"A\">y</obs>\n");
        assert_eq!(
            msgs,
            vec![
                "malformed `<obs>` tag: unknown attribute `who`",
                "`</obs>` without a matching `<obs>`",
            ]
        );
    }

    #[test]
    fn unclosed_err_at_end_of_document() {
        let src = "x <err>\n\nrest\n";
        let diags = check_markers(src, 0, &RewriteConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "`<err>` is never closed");
        assert!(diags[0].notes[0].contains("dropped"));
        assert_eq!(&src[diags[0].span.clone()], "<err>");
    }

    #[test]
    fn literal_policy_changes_the_note() {
        let config = RewriteConfig {
            unclosed_debug: UnclosedDebug::Literal,
            ..RewriteConfig::default()
        };
        let diags = check_markers("x <err>\n", 0, &config);
        assert!(diags[0].notes[0].contains("left as they are"));
    }

    #[test]
    fn lone_marker_lines_are_seen() {
        let src = "<err>\ninside\n\n</err>\n";
        assert!(messages(src).is_empty());

        let diags = check_markers("</err>\n", 0, &RewriteConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].span, 0..6);
    }

    #[test]
    fn nested_err_is_reported() {
        assert_eq!(
            messages("x <err>\n\ny <err>\n\n</err>\n"),
            vec!["nested `<err>` inside an open debug block"]
        );
    }

    #[test]
    fn err_inside_an_annotation_is_annotation_content() {
        let src = "a <obs>x <err></obs>\n\nb </err>\n";
        let diags = check_markers(src, 0, &RewriteConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "`</err>` without a matching `<err>`");
        assert_eq!(&src[diags[0].span.clone()], "</err>");
    }

    #[test]
    fn err_after_an_unclosed_annotation_still_opens_a_scope() {
        assert_eq!(
            messages("a <obs>x <err>\n\nb </err>\n"),
            vec!["`<obs>` is never closed"]
        );
        assert_eq!(
            messages("a <obs>x <err>\n"),
            vec!["`<obs>` is never closed", "`<err>` is never closed"]
        );
    }

    #[test]
    fn blockquote_is_a_separate_context() {
        assert_eq!(
            messages("> a <err>\n\nb </err>\n"),
            vec!["`<err>` is never closed", "`</err>` without a matching `<err>`"]
        );
    }
}
