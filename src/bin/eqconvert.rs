//! CLI binary for edgequake-convert.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConverterConfig`, opens the persisted history and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_convert::{
    convert_inputs_stream, default_state_dir, export_history_to_file, formats,
    save_history_result, write_result, ConversionOutput, ConversionProgressCallback, ConvertError,
    Converter, ConverterConfig, EntryStatus, FileStore, Format, HistoryLedger, KvStore,
    Preferences, ProgressCallback, SourceFormat, Stage, Theme, DEFAULT_ARCHIVE_FILE_NAME,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner for the whole batch plus a log
/// line per finished attempt. Attempts may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// File name per in-flight entry id, for stage messages.
    names: Mutex<HashMap<String, String>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
        })
    }

    fn name_of(&self, entry_id: &str) -> String {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entry_id)
            .cloned()
            .unwrap_or_else(|| short_id(entry_id).to_string())
    }

    fn forget(&self, entry_id: &str) -> String {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entry_id)
            .unwrap_or_else(|| short_id(entry_id).to_string())
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_attempt_start(&self, entry_id: &str, file_name: &str) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry_id.to_string(), file_name.to_string());
        self.bar.set_message(file_name.to_string());
    }

    fn on_stage(&self, entry_id: &str, stage: Stage) {
        self.bar
            .set_message(format!("{}  {}", self.name_of(entry_id), dim(&stage.to_string())));
    }

    fn on_attempt_complete(&self, entry_id: &str, is_binary: bool) {
        let name = self.forget(entry_id);
        let kind = if is_binary { "binary" } else { "text" };
        self.bar.println(format!(
            "  {} {:<32}  {}",
            green("✓"),
            name,
            dim(&format!("{kind} · {}", short_id(entry_id)))
        ));
    }

    fn on_attempt_error(&self, entry_id: &str, error: &str) {
        let name = self.forget(entry_id);
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((idx, _)) => format!("{}\u{2026}", &error[..idx]),
            None => error.to_string(),
        };
        self.bar
            .println(format!("  {} {:<32}  {}", red("✗"), name, red(&msg)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # JSON to YAML (stdout)
  eqconvert convert config.json --to yaml

  # CSV to a PDF table
  eqconvert convert sales.csv --to pdf -o sales.pdf

  # Let the model detect the source format
  eqconvert convert snippet.txt --from auto --to python

  # Re-encode an image (no API key needed)
  eqconvert convert photo.png --to webp

  # Many files at once
  eqconvert convert a.json b.json c.json --to yaml --out-dir converted/

  # History
  eqconvert history list
  eqconvert history save 3f2a9c1e -o result.pdf
  eqconvert history export

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  EQCONVERT_STATE_DIR     Where history and preferences are stored
"#;

/// Convert files between text, data, code, document and image formats.
#[derive(Parser, Debug)]
#[command(
    name = "eqconvert",
    version,
    about = "Convert files between text, data, code, document and image formats",
    long_about = "Convert files between formats. Text, data and code conversions are done by an \
LLM (OpenAI, Anthropic, Google Gemini, Ollama, ...); PDF, DOCX and XLSX files are built locally \
from a markdown intermediate; images are re-encoded locally. Every attempt is recorded in a \
persisted history.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding history and preferences.
    #[arg(long, global = true, env = "EQCONVERT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EQCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EQCONVERT_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "EQCONVERT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one or more files or URLs.
    Convert(ConvertArgs),
    /// List supported formats.
    Formats {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Inspect or manage the conversion history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show, set or toggle the theme preference.
    Theme {
        /// light, dark or toggle. Omit to print the current theme.
        mode: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Target format (json, yaml, pdf, docx, xlsx, png, ...).
    #[arg(long, short = 't')]
    to: String,

    /// Source format, or `auto` to ask the model. Default: sniffed from the
    /// content and file extension.
    #[arg(long, short = 'f')]
    from: Option<String>,

    /// Write the result to this file (single input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write results into this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print a JSON summary per result instead of the content.
    #[arg(long)]
    json: bool,

    /// Number of conversions run at once.
    #[arg(short, long, env = "EQCONVERT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Max LLM output tokens per conversion.
    #[arg(long, env = "EQCONVERT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EQCONVERT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per LLM call.
    #[arg(long, env = "EQCONVERT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "EQCONVERT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EQCONVERT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "EQCONVERT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List past attempts, newest first.
    List {
        /// Print the raw history JSON.
        #[arg(long)]
        json: bool,
    },
    /// Export the whole history to a JSON file.
    Export {
        #[arg(short, long, default_value = DEFAULT_ARCHIVE_FILE_NAME)]
        output: PathBuf,
    },
    /// Save the result of a completed attempt to disk.
    Save {
        /// Entry id, or a unique prefix of it.
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every history entry.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // per-attempt lines provide the feedback that matters.
    let is_convert = matches!(cli.command, Command::Convert(ref a) if !a.json);
    let show_progress = is_convert && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || !is_convert {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let state_dir = cli.state_dir.clone().unwrap_or_else(default_state_dir);

    match cli.command {
        Command::Formats { json } => print_formats(json),
        Command::Theme { ref mode } => run_theme(&state_dir, mode.as_deref(), cli.quiet),
        Command::History { ref action } => run_history(&state_dir, action, cli.quiet).await,
        Command::Convert(ref args) => run_convert(&cli, args, &state_dir, show_progress).await,
    }
}

fn open_store(state_dir: &Path) -> Result<Arc<dyn KvStore>> {
    let store = FileStore::open(state_dir)
        .with_context(|| format!("Failed to open state directory {}", state_dir.display()))?;
    Ok(Arc::new(store))
}

fn open_ledger(state_dir: &Path) -> Result<Arc<HistoryLedger>> {
    let ledger = HistoryLedger::load(open_store(state_dir)?).context("Failed to load history")?;
    Ok(Arc::new(ledger))
}

// ── convert ──────────────────────────────────────────────────────────────

async fn run_convert(
    cli: &Cli,
    args: &ConvertArgs,
    state_dir: &Path,
    show_progress: bool,
) -> Result<()> {
    let target: Format = args.to.parse()?;
    let source: Option<SourceFormat> = args.from.as_deref().map(str::parse).transpose()?;
    if args.output.is_some() && args.inputs.len() > 1 {
        bail!("--output takes a single input; use --out-dir for several");
    }

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        cli,
        args,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )
    .await?;

    let ledger = open_ledger(state_dir)?;
    let converter = Arc::new(
        Converter::from_config(config, ledger).context("Failed to initialise the LLM provider")?,
    );

    let batch = args.inputs.len() > 1;
    let names = batch.then(|| batch_file_names(&args.inputs, target));
    let mut results = convert_inputs_stream(converter, args.inputs.clone(), target, source);
    let mut failed = 0usize;

    while let Some(item) = results.next().await {
        match item.result {
            Ok(output) => {
                let name = names.as_ref().map(|n| n[item.index].as_str());
                emit_result(args, &item.label, &output, name)
                    .await
                    .with_context(|| format!("Failed to write result for {}", item.label))?;
            }
            Err(e) => {
                failed += 1;
                report_failure(&item.label, &e, progress.is_some());
            }
        }
    }
    if let Some(ref cb) = progress {
        cb.finish();
    }

    if failed > 0 {
        bail!("{} of {} conversions failed", failed, args.inputs.len());
    }
    if !cli.quiet && batch {
        eprintln!(
            "{} {} files converted",
            green("✔"),
            bold(&args.inputs.len().to_string())
        );
    }
    Ok(())
}

/// Put one result where the flags say: `-o`, `--out-dir`, stdout for a
/// single text result, or a file in the working directory.
///
/// `batch_name` is the pre-assigned output name when converting several
/// inputs; single conversions use the suggested file name.
async fn emit_result(
    args: &ConvertArgs,
    label: &str,
    output: &ConversionOutput,
    batch_name: Option<&str>,
) -> Result<()> {
    let result = &output.result;
    let file_name = batch_name.unwrap_or(result.suggested_file_name.as_str());
    let path = if let Some(ref p) = args.output {
        Some(p.clone())
    } else if let Some(ref dir) = args.out_dir {
        Some(dir.join(file_name))
    } else if result.is_binary || batch_name.is_some() {
        Some(PathBuf::from(file_name))
    } else {
        None
    };

    if args.json {
        let inline_content = path.is_none().then_some(&result.content);
        let summary = serde_json::json!({
            "input": label,
            "entryId": output.entry_id,
            "source": output.source.to_string(),
            "target": output.target.id(),
            "isBinary": result.is_binary,
            "suggestedFileName": result.suggested_file_name,
            "path": path.as_ref().map(|p| p.display().to_string()),
            "content": inline_content,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    match path {
        Some(path) => {
            write_result(result, &path).await?;
            eprintln!(
                "{}  {}  →  {}",
                green("✔"),
                label,
                bold(&path.display().to_string())
            );
        }
        None if !args.json => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(result.content.as_bytes())
                .context("Failed to write to stdout")?;
            if !result.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
        None => {}
    }
    Ok(())
}

/// Output names for a batch, one per input, all distinct.
///
/// Outputs are named after their inputs (`a/x.json` → `x.yaml`) so
/// concurrent results never share a millisecond-based name. Repeated stems
/// get a numeric suffix (`x-2.yaml`); inputs without a usable stem become
/// `converted-<position>`.
fn batch_file_names(inputs: &[String], target: Format) -> Vec<String> {
    let ext = target.extension();
    let mut used = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let stem = Path::new(input)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("converted-{}", i + 1));
            let mut name = format!("{stem}.{ext}");
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{stem}-{n}.{ext}");
                n += 1;
            }
            name
        })
        .collect()
}

fn report_failure(label: &str, err: &ConvertError, progress_shown: bool) {
    match err {
        ConvertError::Anomaly { entry_id, .. } => {
            // The spinner already printed the cause.
            if !progress_shown {
                eprintln!("{} {}: {}", red("✘"), label, err);
                eprintln!("   {}", dim(&format!("cause: {}", err.root_cause())));
            }
            eprintln!("   {}", dim(&format!("history entry {}", short_id(entry_id))));
        }
        other => eprintln!("{} {}: {}", red("✘"), label, other),
    }
}

/// Map CLI args to `ConverterConfig`.
async fn build_config(
    cli: &Cli,
    args: &ConvertArgs,
    progress: Option<ProgressCallback>,
) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

// ── formats ──────────────────────────────────────────────────────────────

fn print_formats(json: bool) -> Result<()> {
    let catalog = formats::list();
    if json {
        println!("{}", serde_json::to_string_pretty(catalog)?);
        return Ok(());
    }
    println!(
        "{}",
        bold(&format!("{:<12} {:<14} {:<10} EXT", "ID", "LABEL", "KIND"))
    );
    for d in catalog {
        println!("{:<12} {:<14} {:<10} .{}", d.id, d.label, d.kind.to_string(), d.extension);
    }
    Ok(())
}

// ── history ──────────────────────────────────────────────────────────────

async fn run_history(state_dir: &Path, action: &HistoryAction, quiet: bool) -> Result<()> {
    let ledger = open_ledger(state_dir)?;

    match action {
        HistoryAction::List { json } => {
            if *json {
                println!("{}", ledger.export()?);
                return Ok(());
            }
            let entries = ledger.entries();
            if entries.is_empty() {
                if !quiet {
                    eprintln!("{}", dim("No conversions yet."));
                }
                return Ok(());
            }
            for e in entries {
                let status = match e.status {
                    EntryStatus::Completed => green("completed"),
                    EntryStatus::Failed => red("failed   "),
                    EntryStatus::Pending => cyan("pending  "),
                };
                println!(
                    "{}  {}  {}  {:<28} {} → {}",
                    bold(short_id(&e.id)),
                    dim(&e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                    status,
                    e.file_name,
                    e.source_format,
                    e.target_format
                );
            }
        }
        HistoryAction::Export { output } => {
            let n = export_history_to_file(&ledger, output).await?;
            if !quiet {
                eprintln!(
                    "{} {} entries  →  {}",
                    green("✔"),
                    n,
                    bold(&output.display().to_string())
                );
            }
        }
        HistoryAction::Save { id, output } => {
            let id = resolve_entry_id(&ledger, id)?;
            let path = save_history_result(&ledger, &id, output.as_deref(), Path::new(".")).await?;
            if !quiet {
                eprintln!("{}  {}  →  {}", green("✔"), short_id(&id), bold(&path.display().to_string()));
            }
        }
        HistoryAction::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear {} history entries without --yes", ledger.len());
            }
            let n = ledger.len();
            ledger.clear()?;
            if !quiet {
                eprintln!("{} cleared {} entries", green("✔"), n);
            }
        }
    }
    Ok(())
}

/// Accept a full id or a unique prefix of one.
fn resolve_entry_id(ledger: &HistoryLedger, prefix: &str) -> Result<String> {
    let matches: Vec<String> = ledger
        .entries()
        .into_iter()
        .map(|e| e.id)
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.clone()),
        [] => bail!("No history entry matches '{}'", prefix),
        many => bail!("'{}' matches {} entries; use more characters", prefix, many.len()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ── theme ────────────────────────────────────────────────────────────────

fn run_theme(state_dir: &Path, mode: Option<&str>, quiet: bool) -> Result<()> {
    let prefs = Preferences::load(open_store(state_dir)?).context("Failed to load preferences")?;
    let theme = match mode {
        None => prefs.theme(),
        Some(m) if m.eq_ignore_ascii_case("toggle") => prefs.toggle_theme()?,
        Some(m) => {
            let theme: Theme = m.parse().map_err(anyhow::Error::msg)?;
            prefs.set_theme(theme)?;
            theme
        }
    };
    if !quiet || mode.is_none() {
        println!("{theme}");
    }
    Ok(())
}
