use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use modekit_editor::modes::CoffeeMode;
use modekit_editor::{
    Annotation, BracketFoldMode, FoldMode, FoldStyle, IndentFoldMode, LanguageMode, TextDocument,
    fold_ranges,
};
use modekit_lexer::modes::coffee;
use modekit_lexer::{Token, Tokenizer, TokenizerConfig};
use modekit_worker::{BracketLinter, ProcessSpawner, ThreadSpawner, WorkerClient, WorkerConfig};
use serde::Serialize;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "modekit")]
#[command(about = "modekit editing-mode tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize a CoffeeScript file and emit the tokens of every line as JSON
    Tokenize {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Cap on tokens per line; the rest of a longer line becomes one text token
        #[arg(long, default_value_t = TokenizerConfig::default().max_tokens_per_line)]
        max_tokens: usize,
    },
    /// List fold ranges, or the fold starting at one row
    Fold {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(long)]
        row: Option<usize>,
        #[arg(long, value_enum, default_value_t = Style::MarkBegin)]
        style: Style,
        #[arg(long, value_enum, default_value_t = Mode::Coffee)]
        mode: Mode,
    },
    /// Check bracket balance through the background worker
    Lint {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Worker configuration file (defaults to the per-user config)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Run the worker on a thread instead of a child process
        #[arg(long)]
        in_process: bool,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    MarkBegin,
    MarkBeginEnd,
}

impl From<Style> for FoldStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::MarkBegin => FoldStyle::MarkBegin,
            Style::MarkBeginEnd => FoldStyle::MarkBeginEnd,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// CoffeeScript block markers: trailing brackets, `=`, arrows, `class`
    Coffee,
    /// Any deeper-indented rows, plus runs of `#` comments
    Indent,
    /// Brace, bracket and `/* */` folding
    Cstyle,
}

#[derive(Serialize)]
struct LineDump<'a> {
    row: usize,
    end_state: &'a str,
    tokens: &'a [Token],
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tokenize { path, max_tokens } => {
            let text = read(&path)?;
            let config = TokenizerConfig {
                max_tokens_per_line: max_tokens,
            };
            let tokenizer = Tokenizer::with_config(coffee::rule_table()?, config);
            let lines: Vec<&str> = text.lines().collect();
            let tokenized = tokenizer.tokenize_lines(lines.iter().copied());
            let dump: Vec<LineDump<'_>> = tokenized
                .iter()
                .enumerate()
                .map(|(row, line)| LineDump {
                    row,
                    end_state: tokenizer.state_name(line.end_state),
                    tokens: &line.tokens,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        Commands::Fold {
            path,
            row,
            style,
            mode,
        } => {
            let doc = TextDocument::new(&read(&path)?);
            let coffee_mode;
            let cstyle;
            let indent;
            let folder: &dyn FoldMode = match mode {
                Mode::Coffee => {
                    coffee_mode = CoffeeMode::new()?;
                    coffee_mode.fold_mode()
                }
                Mode::Indent => {
                    indent = IndentFoldMode::new("#");
                    &indent
                }
                Mode::Cstyle => {
                    cstyle = BracketFoldMode::cstyle();
                    &cstyle
                }
            };
            match row {
                Some(row) => match folder.fold_range_at(&doc, row, style.into()) {
                    Some(range) => println!("{range}"),
                    None => {
                        println!("no fold starts at row {row}");
                        return Ok(ExitCode::FAILURE);
                    }
                },
                None => {
                    for range in fold_ranges(folder, &doc, style.into()) {
                        println!("{range}");
                    }
                }
            }
        }
        Commands::Lint {
            path,
            config,
            in_process,
            timeout_ms,
        } => {
            let text = read(&path)?;
            let config = match config {
                Some(path) => WorkerConfig::load(&path)?,
                None => WorkerConfig::load_or_default(),
            };
            let found = lint(config, text, in_process, Duration::from_millis(timeout_ms))?;
            if let Some(annotation) = found {
                let (row, column) = (annotation.row + 1, annotation.column + 1);
                println!("{}:{row}:{column}: {}", path.display(), annotation.text);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Sends `text` to a worker and waits for its first verdict.
fn lint(
    config: WorkerConfig,
    text: String,
    in_process: bool,
    timeout: Duration,
) -> anyhow::Result<Option<Annotation>> {
    let doc = Rc::new(RefCell::new(TextDocument::new(&text)));
    let mut client = WorkerClient::new(config);
    if in_process {
        let linter = BracketLinter::new()?;
        client.start(&ThreadSpawner::new(move || linter.clone()))?;
    } else {
        client.start(&ProcessSpawner)?;
    }
    client.attach_to_document(&doc)?;

    let verdict: Rc<RefCell<Option<Option<Annotation>>>> = Rc::new(RefCell::new(None));
    let on_error = Rc::clone(&verdict);
    client.on("error", move |data| {
        match serde_json::from_value::<Annotation>(data.clone()) {
            Ok(annotation) => *on_error.borrow_mut() = Some(Some(annotation)),
            Err(e) => log::warn!("malformed annotation from worker: {e}"),
        }
    });
    let on_ok = Rc::clone(&verdict);
    client.on("ok", move |_| *on_ok.borrow_mut() = Some(None));

    let deadline = Instant::now() + timeout;
    while verdict.borrow().is_none() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            bail!("worker gave no verdict within {timeout:?}");
        }
        client.pump_timeout(left)?;
    }
    client.terminate();
    let result = verdict.borrow_mut().take().flatten();
    Ok(result)
}
