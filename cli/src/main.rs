mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use log::{LevelFilter, debug};
use thiserror::Error;

use obsmark::Diagnostic;
use rewriter::{ConfigError, RewriteConfig};

const SUBCOMMANDS: &[&str] = &["render", "check", "tex", "test", "help"];

#[derive(Parser)]
#[command(name = "obsmark", version, about = "Rewrite <obs> annotations and <err> debug blocks in markdown notes")]
struct Cli {
    /// Disable colored diagnostic output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log rewriter decisions to stderr (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite a markdown file and print the result
    Render(RenderArgs),

    /// Report markers that will be left as literal text
    Check(CheckArgs),

    /// Convert LaTeX notes to markers, or tidy converted markdown
    Tex(TexArgs),

    /// Run .test.md conformance files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Markdown source file
    file: String,

    /// Config file (defaults to obsmark.toml next to the input, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit HTML instead of markdown
    #[arg(long)]
    html: bool,

    /// Dump the rewritten document tree
    #[arg(long)]
    ast: bool,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Markdown source file
    file: String,

    /// Config file (defaults to obsmark.toml next to the input, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TexArgs {
    /// LaTeX source, or converted markdown with --format
    file: String,

    /// Tidy already-converted markdown instead of preprocessing LaTeX
    #[arg(long)]
    format: bool,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read '{path}': {source}")]
    Read { path: String, source: std::io::Error },

    #[error("cannot write '{path}': {source}")]
    Write { path: String, source: std::io::Error },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn main() {
    // `obsmark file.md` is shorthand for `obsmark render file.md`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(first_pos) = args.iter().skip(1).position(|a| !a.starts_with('-')) {
        let pos = first_pos + 1;
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(pos, "render".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let result = match cli.command {
        Command::Render(render_args) => do_render(render_args, color_choice),
        Command::Check(check_args) => do_check(check_args, color_choice),
        Command::Tex(tex_args) => do_tex(tex_args),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn read_source(path: &str) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_string(),
        source,
    })
}

fn write_output(output: Option<&Path>, content: &str) -> Result<(), CliError> {
    match output {
        Some(path) => std::fs::write(path, content).map_err(|source| CliError::Write {
            path: path.display().to_string(),
            source,
        }),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

/// An explicit config path, or `obsmark.toml` beside the input file.
fn load_config(explicit: Option<&Path>, input: &str) -> Result<RewriteConfig, CliError> {
    let config = match explicit {
        Some(path) => RewriteConfig::load_from_path(path)?,
        None => {
            let dir = Path::new(input)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            RewriteConfig::discover(dir)?
        }
    };
    debug!("config: {:?}", config);
    Ok(config)
}

fn do_render(args: RenderArgs, color_choice: ColorChoice) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;
    let config = load_config(args.config.as_deref(), &args.file)?;

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let warnings = rewriter::check_markers(&source, file_id, &config);
    emit_diagnostics(color_choice, &files, &warnings);

    let document = obsmark::Parser::new(source).parse();
    let rewritten = rewriter::rewrite_document(&document, &config);

    let content = if args.ast {
        format!("{:#?}\n", rewritten)
    } else if args.html {
        let markdown = rewritten.to_string();
        let mut html = String::new();
        let events = pulldown_cmark::Parser::new_ext(&markdown, obsmark::parser::options());
        pulldown_cmark::html::push_html(&mut html, events);
        html
    } else {
        rewritten.to_string()
    };

    write_output(args.output.as_deref(), &content)?;
    Ok(0)
}

fn do_check(args: CheckArgs, color_choice: ColorChoice) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;
    let config = load_config(args.config.as_deref(), &args.file)?;

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let warnings = rewriter::check_markers(&source, file_id, &config);
    if warnings.is_empty() {
        eprintln!("ok: {} has no marker problems", args.file);
        return Ok(0);
    }

    emit_diagnostics(color_choice, &files, &warnings);
    eprintln!("{}: {} warning(s)", args.file, warnings.len());
    Ok(1)
}

fn do_tex(args: TexArgs) -> Result<i32, CliError> {
    let source = read_source(&args.file)?;

    let content = if args.format {
        let text = obsmark::latex::clean_html_escapes(&source);
        let text = obsmark::latex::finalize_markers(&text);
        obsmark::latex::format_tags(&text)
    } else {
        obsmark::latex::preprocess_latex(&source)
    };

    write_output(args.output.as_deref(), &content)?;
    Ok(0)
}

fn emit_diagnostics(color_choice: ColorChoice, files: &SimpleFiles<String, String>, diagnostics: &[Diagnostic]) {
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    for diag in diagnostics {
        let report = diag.to_report();
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &report);
    }
}
