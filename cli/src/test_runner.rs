use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codespan_reporting::files::{Files, SimpleFile};
use serde::Deserialize;

use obsmark::Diagnostic;
use rewriter::RewriteConfig;

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Expected rewritten markdown (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected marker warnings. If present (even empty), warning count and content are checked.
    /// Each entry checks message substring and optionally the source line.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,

    /// Rewriter settings for this file; same keys as `obsmark.toml`.
    #[serde(default)]
    pub config: RewriteConfig,
}

/// Parse a `.test.md` file into its TOML config and markdown source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let source = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    // 1. Read file
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    // 2. Parse frontmatter
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };

    let description = config.description.clone();

    // 3. Rewrite
    let document = obsmark::Parser::new(source.to_string()).parse();
    let rewritten = rewriter::rewrite_document(&document, &config.config);

    // 4. Check output
    if let Some(expected_output) = &config.expect_output {
        let actual = rewritten.to_string();
        let actual_trimmed = actual.trim();
        let expected_trimmed = expected_output.trim();
        if actual_trimmed != expected_trimmed {
            return fail(
                description,
                format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected_trimmed),
                    indent(actual_trimmed)
                ),
            );
        }
    }

    // 5. Check warning expectations
    if let Some(expected_warnings) = &config.expect_warnings {
        let diagnostics = rewriter::check_markers(source, 0, &config.config);
        if let Some(reason) = check_warnings(source, &diagnostics, expected_warnings) {
            return fail(description, reason);
        }
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 1-based line of a byte offset, as codespan reports it.
fn line_of(source: &str, offset: usize) -> usize {
    let file = SimpleFile::new("", source);
    file.line_index((), offset.min(source.len())).unwrap_or(0) + 1
}

/// Check that actual warnings match expectations. Returns `Some(reason)` on mismatch.
fn check_warnings(
    source: &str,
    diagnostics: &[Diagnostic],
    expected: &[ExpectedWarning],
) -> Option<String> {
    let actual_warnings: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_warning()).collect();

    if actual_warnings.len() != expected.len() {
        let actual_msgs: Vec<String> = actual_warnings
            .iter()
            .map(|w| format!("  - {}", w.message))
            .collect();
        return Some(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            actual_warnings.len(),
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual_warnings.iter().zip(expected.iter()).enumerate() {
        if !actual.message.contains(&expected.contains) {
            return Some(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, actual.message
            ));
        }

        if let Some(expected_line) = expected.line {
            let actual_line = line_of(source, actual.span.start);
            if actual_line != expected_line {
                return Some(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i, expected_line, actual_line
                ));
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Suite discovery
// ---------------------------------------------------------------------------

/// Conformance files grouped by the folder they sit in, relative to the root.
/// Files directly under the root form the unnamed group.
struct Suite {
    groups: BTreeMap<String, Vec<PathBuf>>,
}

impl Suite {
    fn discover(root: &Path) -> Suite {
        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for path in entries.flatten().map(|e| e.path()) {
                if path.is_dir() {
                    pending.push(path);
                } else if is_conformance_file(&path) {
                    let group = dir
                        .strip_prefix(root)
                        .map(|p| p.to_string_lossy().replace('\\', "/"))
                        .unwrap_or_default();
                    groups.entry(group).or_default().push(path);
                }
            }
        }
        for files in groups.values_mut() {
            files.sort();
        }
        Suite { groups }
    }

    fn names(&self) -> String {
        self.groups.keys().map(|k| group_name(k)).collect::<Vec<_>>().join(", ")
    }

    /// Groups matching any requested name, or every group when none is given.
    /// A name also selects the groups nested below it.
    fn select(&self, requested: &[String]) -> Vec<(&str, &[PathBuf])> {
        if requested.is_empty() {
            return self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
        }
        for name in requested {
            let name = name.trim_matches('/');
            if !self.groups.keys().any(|k| in_group(k, name)) {
                eprintln!("warning: no conformance group '{}' (have: {})", name, self.names());
            }
        }
        self.groups
            .iter()
            .filter(|(k, _)| requested.iter().any(|r| in_group(k, r.trim_matches('/'))))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect()
    }
}

fn is_conformance_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".test.md"))
}

fn in_group(group: &str, name: &str) -> bool {
    group == name || group.strip_prefix(name).is_some_and(|rest| rest.starts_with('/'))
}

fn group_name(group: &str) -> &str {
    if group.is_empty() { "(top level)" } else { group }
}

/// Print the conformance groups under `path` with their file counts.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single conformance file", path.display());
        return;
    }

    let suite = Suite::discover(path);
    if suite.groups.is_empty() {
        eprintln!("no conformance files (.test.md) under {}", path.display());
        return;
    }
    for (group, files) in &suite.groups {
        eprintln!("{:>4}  {}", files.len(), group_name(group));
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Collects results as files run and prints the closing summary.
struct Report {
    no_color: bool,
    passed: usize,
    failures: Vec<TestResult>,
}

impl Report {
    fn new(no_color: bool) -> Self {
        Report {
            no_color,
            passed: 0,
            failures: Vec::new(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn group(&self, group: &str) {
        eprintln!();
        eprintln!("{}", self.paint(group_name(group), "1"));
    }

    fn record(&mut self, result: TestResult) {
        let name = result.description.clone().unwrap_or_else(|| {
            let stem = result.path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
            stem.trim_end_matches(".test.md").to_string()
        });
        match &result.outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                eprintln!("  {}  {}", self.paint("ok  ", "32"), name);
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", self.paint("FAIL", "31"), name);
                self.failures.push(result);
            }
        }
    }

    /// Print failure details and totals; the exit code is 1 if anything failed.
    fn finish(self) -> i32 {
        for failure in &self.failures {
            if let TestOutcome::Fail(reason) = &failure.outcome {
                eprintln!();
                eprintln!("{}:", failure.path.display());
                eprintln!("{}", indent(reason));
            }
        }

        let failed = self.failures.len();
        let verdict = if failed == 0 {
            self.paint("all rewrites match", "32")
        } else {
            self.paint("rewrites differ", "31")
        };
        eprintln!();
        eprintln!(
            "conformance: {}; {} passed, {} failed",
            verdict, self.passed, failed
        );
        i32::from(failed > 0)
    }
}

/// Run one `.test.md` file, or every one under a directory, restricted to
/// `categories` when any are given. Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let mut report = Report::new(no_color);

    if path.is_file() {
        report.record(run_single_test(path));
        return report.finish();
    }

    let suite = Suite::discover(path);
    if suite.groups.is_empty() {
        eprintln!("no conformance files (.test.md) under {}", path.display());
        return 1;
    }
    let selected = suite.select(categories);
    if selected.is_empty() {
        eprintln!("nothing selected to run");
        return 1;
    }

    for (group, files) in selected {
        report.group(group);
        for file in files {
            report.record(run_single_test(file));
        }
    }
    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewriter::UnclosedDebug;

    #[test]
    fn frontmatter_and_source_are_split() {
        let content = "---\ndescription = \"d\"\nexpect_output = \"x\"\n---\nbody\n";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(config.description.as_deref(), Some("d"));
        assert_eq!(config.expect_output.as_deref(), Some("x"));
        assert!(config.expect_warnings.is_none());
        assert_eq!(config.config, RewriteConfig::default());
        assert_eq!(source, "body\n");
    }

    #[test]
    fn config_table_overrides_defaults() {
        let content = "---\n[config]\nunclosed_debug = \"literal\"\n---\n";
        let (config, _) = parse_test_file(content).unwrap();
        assert_eq!(config.config.unclosed_debug, UnclosedDebug::Literal);
    }

    #[test]
    fn missing_delimiters_are_reported() {
        assert!(parse_test_file("no frontmatter").is_err());
        assert!(parse_test_file("---\ndescription = \"d\"\n").is_err());
    }

    #[test]
    fn line_numbers_are_one_based() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 2), 2);
        assert_eq!(line_of("a\nb\nc", 4), 3);
    }

    #[test]
    fn groups_follow_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("debug/nested")).unwrap();
        std::fs::write(dir.path().join("top.test.md"), "").unwrap();
        std::fs::write(dir.path().join("debug/a.test.md"), "").unwrap();
        std::fs::write(dir.path().join("debug/nested/b.test.md"), "").unwrap();
        std::fs::write(dir.path().join("debug/notes.md"), "").unwrap();

        let suite = Suite::discover(dir.path());
        let names: Vec<&str> = suite.groups.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["", "debug", "debug/nested"]);
        assert_eq!(suite.groups["debug"].len(), 1);

        let selected: Vec<&str> = suite.select(&["debug".to_string()]).into_iter().map(|(g, _)| g).collect();
        assert_eq!(selected, vec!["debug", "debug/nested"]);
        assert!(suite.select(&["deb".to_string()]).is_empty());
    }

    #[test]
    fn failing_file_sets_the_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.test.md");
        let bad = dir.path().join("bad.test.md");
        std::fs::write(&good, "---\nexpect_output = \"a\"\n---\na\n").unwrap();
        std::fs::write(&bad, "---\nexpect_output = \"b\"\n---\na\n").unwrap();

        assert_eq!(run_tests(&good, true, &[]), 0);
        assert_eq!(run_tests(&bad, true, &[]), 1);
        assert_eq!(run_tests(dir.path(), true, &[]), 1);
    }
}
