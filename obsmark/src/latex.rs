//! Conversion helpers for notes written in LaTeX.
//!
//! `preprocess_latex` rewrites the `err` environment and `\o[...]{...}`
//! observation macros into the `<err>`/`<obs>` markers understood by the
//! rewriter, before the source is handed to an external LaTeX → Markdown
//! converter. The remaining functions tidy the converter's Markdown output.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PYTHON_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{python\}(?:\[[^\]]*\])?\n(.*?)\\end\{python\}").unwrap());

static ERR_ENV: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\begin\{err\}\n?(.*?)\\end\{err\}").unwrap());

/// `TIME (AUTHOR)` or just `TIME`.
static OBS_ATTRS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^(.*?)\s*(\(([^)]+)\))?$").unwrap());

static OBS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(<obs[^>]*>)(.*?)(</obs>)").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static INDENTED_OBS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*<obs").unwrap());

static ERR_OPEN_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"<err>[ \t]*\n+").unwrap());

static OBS_CLOSE_TRAILING: Lazy<Regex> = Lazy::new(|| Regex::new(r"</obs>\s*").unwrap());

static ERR_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<err>|</err>").unwrap());

static TRAILING_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());

const PYTHON_START: &str = "%%PYTHON_START%%";
const PYTHON_END: &str = "%%PYTHON_END%%";

/// Return the index of the delimiter closing the one at `start`, honouring nesting.
fn find_matching(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 1;
    for (i, &b) in text.as_bytes().iter().enumerate().skip(start + 1) {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Rewrite custom LaTeX constructs into markers that survive conversion.
pub fn preprocess_latex(src: &str) -> String {
    // python blocks are kept byte for byte behind sentinels
    let src = PYTHON_ENV.replace_all(src, |caps: &Captures| {
        format!(
            "\\begin{{verbatim}}\n{}\n{}{}\n\\end{{verbatim}}",
            PYTHON_START, &caps[1], PYTHON_END
        )
    });

    let src = ERR_ENV.replace_all(&src, |caps: &Captures| format!("<err>{}</err>", &caps[1]));

    expand_observations(&src)
}

/// Expand `\o[ATTRS]{BODY}` macros. Conversion stops at the first unbalanced
/// macro and the rest of the input is kept verbatim.
fn expand_observations(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    loop {
        let Some(found) = src[i..].find("\\o[") else {
            out.push_str(&src[i..]);
            break;
        };
        let idx = i + found;
        out.push_str(&src[i..idx]);

        let attrs_open = idx + 2;
        let Some(attrs_close) = find_matching(src, attrs_open, b'[', b']') else {
            out.push_str(&src[idx..]);
            break;
        };
        let body_open = attrs_close + 1;
        if src.as_bytes().get(body_open) != Some(&b'{') {
            out.push_str(&src[idx..]);
            break;
        }
        let Some(body_close) = find_matching(src, body_open, b'{', b'}') else {
            out.push_str(&src[idx..]);
            break;
        };

        let (time, author) = split_observation_attrs(&src[attrs_open + 1..attrs_close]);
        out.push_str(&format!("<obs time=\"{}\"", time));
        if let Some(author) = author {
            out.push_str(&format!(" author=\"{}\"", author));
        }
        out.push('>');
        out.push_str(&src[body_open + 1..body_close]);
        out.push_str("</obs>");

        i = body_close + 1;
    }

    out
}

fn split_observation_attrs(attrs: &str) -> (String, Option<String>) {
    let attrs = attrs.trim();
    match OBS_ATTRS.captures(attrs) {
        Some(caps) => (
            caps[1].trim().to_string(),
            caps.get(3).map(|m| m.as_str().to_string()),
        ),
        None => (attrs.to_string(), None),
    }
}

/// Undo the backslash escaping a converter applies to raw html.
pub fn clean_html_escapes(text: &str) -> String {
    text.replace("\\<", "<").replace("\\>", ">").replace("\\\"", "\"")
}

/// Replace python sentinels with fenced `{python}` code blocks.
pub fn finalize_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_python = false;

    for line in text.split_inclusive('\n') {
        let marker = line.trim_start();
        if marker.starts_with(PYTHON_START) {
            out.push_str("```{python}\n");
            in_python = true;
        } else if marker.starts_with(PYTHON_END) {
            out.push_str("```\n");
            in_python = false;
        } else if in_python && line.starts_with("    ") {
            out.push_str(&line[4..]);
        } else {
            out.push_str(line);
        }
    }

    out
}

/// Normalize whitespace inside each `<obs>` tag and wrap it at `width` columns.
/// Continuation lines are indented to the width of the opening tag.
pub fn format_observations(text: &str, width: usize) -> String {
    let avail = width.saturating_sub("</obs>".len());

    OBS_TAG
        .replace_all(text, |caps: &Captures| {
            let open_tag = WHITESPACE.replace_all(caps[1].trim(), " ").into_owned();
            let indent = " ".repeat(open_tag.chars().count());

            let mut lines = Vec::new();
            let mut line = open_tag.clone();
            for word in caps[2].split_whitespace() {
                if line.chars().count() + 1 + word.chars().count() > avail {
                    lines.push(std::mem::replace(&mut line, format!("{}{}", indent, word)));
                } else {
                    line.push(' ');
                    line.push_str(word);
                }
            }
            line.push_str("</obs>");
            lines.push(line);
            lines.join("\n")
        })
        .into_owned()
}

/// Lay out markers for reading: each observation on its own wrapped lines,
/// `<err>`/`</err>` on their own lines with the body indented per nesting level.
pub fn format_tags(text: &str) -> String {
    const INDENT: &str = "    ";

    let text = format_observations(text, 80);
    let text = INDENTED_OBS.replace_all(&text, "\n<obs").into_owned();
    let text = obs_on_new_line(&text);
    let text = ERR_OPEN_NEWLINES.replace_all(&text, "<err>\n");
    let text = OBS_CLOSE_TRAILING.replace_all(&text, "</obs>\n").into_owned();

    let mut out: Vec<String> = Vec::new();
    let mut depth: usize = 0;
    let mut after_marker = false;

    for part in split_keeping(&ERR_MARKER, &text) {
        if part.is_empty() {
            continue;
        }
        match part {
            "<err>" | "</err>" => {
                if let Some(last) = out.last_mut() {
                    if !last.ends_with('\n') {
                        *last = format!("{}\n", last.trim_end());
                    }
                }
                if part == "<err>" {
                    out.push(format!("{}<err>\n", INDENT.repeat(depth)));
                    depth += 1;
                } else {
                    depth = depth.saturating_sub(1);
                    out.push(format!("{}</err>\n", INDENT.repeat(depth)));
                }
                after_marker = true;
            }
            _ => {
                let part = match part.strip_prefix('\n') {
                    Some(rest) if after_marker => rest,
                    _ => part,
                };
                for line in part.split_inclusive('\n') {
                    if line.trim().is_empty() {
                        out.push(line.to_string());
                    } else {
                        out.push(format!("{}{}", INDENT.repeat(depth), line.trim_start()));
                    }
                }
                after_marker = false;
            }
        }
    }

    TRAILING_BLANKS.replace_all(&out.concat(), "\n").into_owned()
}

/// Start every `<obs` on a new line.
fn obs_on_new_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (pos, _) in text.match_indices("<obs") {
        out.push_str(&text[last..pos]);
        if pos > 0 && !out.ends_with('\n') {
            out.push('\n');
        }
        last = pos;
    }
    out.push_str(&text[last..]);
    out
}

/// Split `text` on `re`, keeping the matches as separate parts.
fn split_keeping<'t>(re: &Regex, text: &'t str) -> Vec<&'t str> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        parts.push(&text[last..m.start()]);
        parts.push(m.as_str());
        last = m.end();
    }
    parts.push(&text[last..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn observation_macro_with_author() {
        assert_eq!(
            preprocess_latex("x \\o[2020-01-02 (Ann)]{saw {it}} y"),
            "x <obs time=\"2020-01-02\" author=\"Ann\">saw {it}</obs> y"
        );
    }

    #[test]
    fn observation_macro_without_author() {
        assert_eq!(preprocess_latex("\\o[noon]{x}"), "<obs time=\"noon\">x</obs>");
    }

    #[test]
    fn unbalanced_macro_is_left_verbatim() {
        assert_eq!(preprocess_latex("a \\o[x]{oops"), "a \\o[x]{oops");
        assert_eq!(preprocess_latex("a \\o[x] b"), "a \\o[x] b");
    }

    #[test]
    fn err_environment_becomes_markers() {
        assert_eq!(
            preprocess_latex("\\begin{err}\nbad\n\\end{err}"),
            "<err>bad\n</err>"
        );
    }

    #[test]
    fn python_environment_is_fenced_by_sentinels() {
        let src = "\\begin{python}[fontsize=small]\nprint(1)\n\\end{python}";
        assert_eq!(
            preprocess_latex(src),
            "\\begin{verbatim}\n%%PYTHON_START%%\nprint(1)\n%%PYTHON_END%%\n\\end{verbatim}"
        );
    }

    #[test]
    fn sentinels_become_fenced_code() {
        let text = "    %%PYTHON_START%%\n    x = 1\n    %%PYTHON_END%%\nafter\n";
        assert_eq!(finalize_markers(text), "```{python}\nx = 1\n```\nafter\n");
    }

    #[test]
    fn escapes_are_removed() {
        assert_eq!(
            clean_html_escapes("\\<obs time=\\\"t\\\"\\>"),
            "<obs time=\"t\">"
        );
    }

    #[test]
    fn long_observation_wraps_under_the_tag() {
        assert_eq!(
            format_observations("<obs>aaa bbb ccc</obs>", 20),
            "<obs> aaa bbb\n     ccc</obs>"
        );
    }

    #[test]
    fn tags_are_laid_out_on_their_own_lines() {
        let text = "text <obs time=\"t\">  a   b </obs> more\n<err>\nline\n</err>\n";
        assert_eq!(
            format_tags(text),
            "text\n<obs time=\"t\"> a b</obs>\nmore\n<err>\n    line\n</err>\n"
        );
    }

    #[test]
    fn nested_err_blocks_indent_per_level() {
        let text = "<err>\na\n<err>\nb\n</err>\n</err>\n";
        assert_eq!(
            format_tags(text),
            "<err>\n    a\n    <err>\n        b\n    </err>\n</err>\n"
        );
    }
}
