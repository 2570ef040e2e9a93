//! CLI binary for pdf2md-queue.
//!
//! A thin shim over the library crate: settings and the job queue live in
//! the data directory, subcommands map onto library operations, and
//! indicatif renders one bar per running job.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pdf2md_queue::{
    combined_download, format_duration, job_download, queue::load_jobs, read_pdf, test_connection,
    write_markdown, AppSettings, ConversionPipeline, DrainOutcome, DrainReport, FileStore, Job,
    JobQueue, JobStatus, KeyValueStore, PipelineConfig, QueueObserver, ServiceDraft, ServiceKind,
    ServicePatch, SettingsStore,
};
use std::collections::HashMap;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

// ── Queue observer using indicatif ───────────────────────────────────────────

/// Terminal view of the queue: a bar per processing job, one log line per
/// finished job.
struct CliObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    show_bars: bool,
    quiet: bool,
}

impl CliObserver {
    fn new(show_bars: bool, quiet: bool) -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            show_bars,
            quiet,
        })
    }

    fn bar_for(&self, job: &Job) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        bars.entry(job.id.clone())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  ")
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
                );
                bar.set_prefix(job.filename.clone());
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            })
            .clone()
    }

    fn finish_line(&self, job: &Job, line: String) {
        if let Some(bar) = self.bars.lock().unwrap_or_else(|e| e.into_inner()).remove(&job.id) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if self.quiet {
            return;
        }
        if self.show_bars {
            self.multi.println(line).ok();
        } else {
            eprintln!("{line}");
        }
    }
}

impl QueueObserver for CliObserver {
    fn on_job_updated(&self, job: &Job) {
        match job.status() {
            JobStatus::Pending => {}
            JobStatus::Processing => {
                if self.show_bars {
                    self.bar_for(job).set_position(u64::from(job.progress()));
                }
            }
            JobStatus::Completed => {
                let took = job.duration_ms().map(format_duration).unwrap_or_default();
                let chars = job.result().map(str::len).unwrap_or(0);
                self.finish_line(
                    job,
                    format!(
                        "  {} {:<40} {}  {}",
                        green("✓"),
                        job.filename,
                        dim(&format!("{chars:>7} chars")),
                        dim(&took)
                    ),
                );
            }
            JobStatus::Error => {
                let msg = job.error().unwrap_or("unknown error");
                let first_line = msg.lines().next().unwrap_or(msg);
                self.finish_line(
                    job,
                    format!("  {} {:<40} {}", red("✗"), job.filename, red(first_line)),
                );
            }
        }
    }

    fn on_drain_started(&self, pending: usize) {
        if !self.quiet && pending > 0 {
            let line = format!("{} {}", cyan("◆"), bold(&format!("Converting {pending} file(s)…")));
            if self.show_bars {
                self.multi.println(line).ok();
            } else {
                eprintln!("{line}");
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store an API key once, then convert
  pdf2md services key openai sk-...
  pdf2md convert paper.pdf slides.pdf -o out/

  # One combined document for the whole batch
  pdf2md convert *.pdf --combined -o out/

  # Switch to Gemini and check connectivity
  pdf2md services use gemini
  pdf2md services key gemini AIza...
  pdf2md services test

  # A self-hosted OpenAI-compatible endpoint
  pdf2md services add --name "Local vLLM" --url http://localhost:8000/v1 --model qwen2.5-vl

  # Resume an interrupted batch
  pdf2md queue list
  pdf2md queue run -o out/

ENVIRONMENT VARIABLES:
  PDF2MD_DATA_DIR         Where settings and the queue snapshot are kept
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override log filtering (e.g. pdf2md_queue=debug)
"#;

/// Batch-convert PDF files to Markdown using vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Batch-convert PDF files to Markdown using vision LLMs",
    long_about = "Render every page of each PDF, send the pages to the active LLM service \
(OpenAI, Gemini, OpenRouter or any OpenAI-compatible endpoint) and save the Markdown. \
Jobs are queued and survive restarts.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory for settings and the queue snapshot.
    #[arg(long, global = true, env = "PDF2MD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Page rasterisation scale (0.5–4.0).
    #[arg(long, global = true, env = "PDF2MD_RENDER_SCALE", default_value_t = 2.0)]
    render_scale: f32,

    /// Disable progress bars.
    #[arg(long, global = true, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2MD_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue PDF files, convert them and write the Markdown.
    Convert(ConvertArgs),
    /// Inspect or drive the persisted queue.
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Manage LLM services.
    #[command(subcommand)]
    Services(ServicesCommand),
    /// Manage saved system prompts.
    #[command(subcommand)]
    Presets(PresetsCommand),
    /// Show or change conversion settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Directory for the Markdown files.
    #[arg(short, long, env = "PDF2MD_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Write one combined.md instead of one file per PDF.
    #[arg(long)]
    combined: bool,

    /// Print the Markdown to stdout instead of writing files.
    #[arg(long, conflicts_with = "combined")]
    stdout: bool,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PDF files to convert.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,

    /// Leave written jobs in the saved queue.
    #[arg(long)]
    keep: bool,

    /// Use this service for this run only.
    #[arg(long)]
    service: Option<String>,

    /// Use this model for this run only.
    #[arg(long)]
    model: Option<String>,

    /// Drop jobs left over from an interrupted session instead of resuming them.
    #[arg(long)]
    discard_previous: bool,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// List the persisted jobs.
    List,
    /// Convert every pending job.
    Run {
        #[command(flatten)]
        output: OutputArgs,
        /// Leave written jobs in the saved queue.
        #[arg(long)]
        keep: bool,
    },
    /// Write the Markdown of completed jobs.
    Export {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Remove one job.
    Remove { id: String },
    /// Remove completed jobs, or everything with --all.
    Clear {
        #[arg(long)]
        all: bool,
    },
    /// Forget the jobs of an interrupted session.
    Discard,
}

#[derive(Subcommand, Debug)]
enum ServicesCommand {
    /// List configured services.
    List,
    /// Make a service active.
    Use { id: String },
    /// Store a service's API key.
    Key { id: String, key: String },
    /// Change a service's default model.
    Model { id: String, model: String },
    /// Add an OpenAI-compatible service.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        key: String,
        /// Model ids; the first is the default.
        #[arg(long = "model", required = true)]
        models: Vec<String>,
        /// Speak the Gemini wire format instead.
        #[arg(long)]
        gemini: bool,
    },
    /// Remove a custom service.
    Remove { id: String },
    /// Check that a service answers (defaults to the active one).
    Test {
        id: Option<String>,
        /// Timeout in seconds [default: 10].
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum PresetsCommand {
    /// List saved prompts.
    List,
    /// Save a prompt, read from a file or the current system prompt.
    Add {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a saved prompt.
    Remove { id: String },
    /// Make a saved prompt the system prompt.
    Apply { id: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current settings.
    Show,
    /// Change one or more settings.
    Set {
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        output_length: Option<u32>,
        /// Read the system prompt from a file.
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        /// Stream OpenAI-format replies.
        #[arg(long)]
        stream: Option<bool>,
    },
    /// Restore the built-in system prompt.
    ResetPrompt,
    /// Restore every setting to its default.
    Reset,
}

// ── Entry point ──────────────────────────────────────────────────────────────

struct App {
    store: Arc<FileStore>,
    settings_store: SettingsStore,
    settings: AppSettings,
    pipeline_config: PipelineConfig,
    show_progress: bool,
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress bars give all the feedback that matters; INFO logs would
    // tear them.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let data_dir = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Cannot determine a data directory; pass --data-dir")?
            .join("pdf2md"),
    };
    let store = Arc::new(FileStore::new(data_dir));
    let settings_store = SettingsStore::new(store.clone());
    let settings = settings_store.load();
    let pipeline_config = PipelineConfig::builder()
        .render_scale(cli.render_scale)
        .build()
        .context("Invalid configuration")?;

    let mut ctx = App {
        store,
        settings_store,
        settings,
        pipeline_config,
        show_progress,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Convert(args) => convert(&mut ctx, args).await,
        Command::Queue(cmd) => queue_command(&ctx, cmd).await,
        Command::Services(cmd) => services_command(&mut ctx, cmd).await,
        Command::Presets(cmd) => presets_command(&mut ctx, cmd).await,
        Command::Settings(cmd) => settings_command(&mut ctx, cmd).await,
    }
}

fn open_queue(ctx: &App, observer: Arc<CliObserver>) -> JobQueue {
    let store: Arc<dyn KeyValueStore> = ctx.store.clone();
    let pipeline = ConversionPipeline::new(ctx.pipeline_config.clone());
    JobQueue::open_with_observer(store, Arc::new(pipeline), Some(observer))
}

/// Resume or drop jobs from an interrupted session.
fn settle_recovery(queue: &JobQueue, discard: bool, quiet: bool) {
    if !queue.has_recoverable() {
        return;
    }
    if discard {
        queue.discard_recovery();
        return;
    }
    let restored = queue.accept_recovery();
    if !quiet {
        eprintln!(
            "{} resumed {} job(s) from the previous session",
            cyan("↻"),
            restored
        );
    }
}

/// Drain the queue; Ctrl-C exits, leaving the snapshot for the next run.
async fn drain(queue: &JobQueue, settings: &AppSettings) -> Result<DrainReport> {
    tokio::select! {
        outcome = queue.process_queue(settings) => match outcome {
            DrainOutcome::Drained(report) => Ok(report),
            DrainOutcome::AlreadyRunning => bail!("The queue is already being processed"),
        },
        _ = tokio::signal::ctrl_c() => {
            if queue.has_active_job() {
                eprintln!(
                    "\n{} a conversion was in progress; it will restart from the beginning next time",
                    yellow("⚠")
                );
            }
            std::process::exit(130);
        }
    }
}

fn write_outputs(jobs: &[Job], args: &OutputArgs, quiet: bool) -> Result<usize> {
    if args.stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for file in jobs.iter().filter_map(job_download) {
            handle
                .write_all(file.content.as_bytes())
                .context("Failed to write to stdout")?;
            if !file.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
        return Ok(0);
    }

    let files: Vec<_> = if args.combined {
        combined_download(jobs).into_iter().collect()
    } else {
        jobs.iter().filter_map(job_download).collect()
    };
    for file in &files {
        let path = write_markdown(&args.output_dir, file)
            .with_context(|| format!("Failed to write {}", file.name))?;
        if !quiet {
            eprintln!("  {} {}", dim("→"), bold(&path.display().to_string()));
        }
    }
    Ok(files.len())
}

/// Write every completed job, recovered ones included, then drop them from
/// the saved queue unless `keep` is set.
fn export_completed(queue: &JobQueue, output: &OutputArgs, keep: bool, quiet: bool) -> Result<()> {
    let finished: Vec<Job> = queue
        .jobs()
        .into_iter()
        .filter(|j| j.status() == JobStatus::Completed)
        .collect();
    write_outputs(&finished, output, quiet)?;
    if !keep {
        queue.clear_completed();
    }
    Ok(())
}

fn summarise(report: &DrainReport, quiet: bool) {
    if quiet {
        return;
    }
    let mark = if report.failed == 0 { green("✔") } else { yellow("⚠") };
    eprintln!(
        "{} {} completed, {} failed",
        mark,
        bold(&report.completed.to_string()),
        if report.failed == 0 {
            report.failed.to_string()
        } else {
            red(&report.failed.to_string())
        }
    );
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn convert(ctx: &mut App, args: ConvertArgs) -> Result<()> {
    if let Some(service) = &args.service {
        ctx.settings
            .switch_active_service(service)
            .context("Cannot select service")?;
    }
    if let Some(model) = &args.model {
        ctx.settings.current_model = model.clone();
    }

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(
            read_pdf(path)
                .await
                .with_context(|| format!("Cannot queue {}", path.display()))?,
        );
    }

    let observer = CliObserver::new(ctx.show_progress, ctx.quiet);
    let queue = open_queue(ctx, observer);
    settle_recovery(&queue, args.discard_previous, ctx.quiet);
    queue.add_files(files);

    let report = drain(&queue, &ctx.settings).await?;
    summarise(&report, ctx.quiet);
    export_completed(&queue, &args.output, args.keep, ctx.quiet)?;

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn queue_command(ctx: &App, cmd: QueueCommand) -> Result<()> {
    match cmd {
        QueueCommand::List => {
            let jobs = load_jobs(ctx.store.as_ref()).context("Cannot read the queue")?;
            if jobs.is_empty() {
                println!("Queue is empty");
            }
            for job in jobs {
                let detail = match job.status() {
                    JobStatus::Completed => {
                        job.duration_ms().map(format_duration).unwrap_or_default()
                    }
                    JobStatus::Error => job
                        .error()
                        .unwrap_or_default()
                        .lines()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    _ => String::new(),
                };
                println!(
                    "{}  {:<10} {:<40} {}",
                    dim(&job.id),
                    job.status(),
                    job.filename,
                    detail
                );
            }
        }
        QueueCommand::Run { output, keep } => {
            let queue = open_queue(ctx, CliObserver::new(ctx.show_progress, ctx.quiet));
            settle_recovery(&queue, false, ctx.quiet);
            let report = drain(&queue, &ctx.settings).await?;
            summarise(&report, ctx.quiet);
            export_completed(&queue, &output, keep, ctx.quiet)?;
        }
        QueueCommand::Export { output } => {
            let jobs = load_jobs(ctx.store.as_ref()).context("Cannot read the queue")?;
            if write_outputs(&jobs, &output, ctx.quiet)? == 0 && !output.stdout {
                bail!("No completed jobs to export");
            }
        }
        QueueCommand::Remove { id } => {
            let queue = open_queue(ctx, CliObserver::new(false, true));
            queue.accept_recovery();
            let job = queue.remove_job(&id)?;
            println!("Removed {}", job.filename);
        }
        QueueCommand::Clear { all } => {
            let queue = open_queue(ctx, CliObserver::new(false, true));
            queue.accept_recovery();
            let removed = if all {
                queue.clear_all()
            } else {
                queue.clear_completed()
            };
            println!("Removed {removed} job(s)");
        }
        QueueCommand::Discard => {
            let queue = open_queue(ctx, CliObserver::new(false, true));
            if queue.discard_recovery() {
                println!("Discarded the previous session's jobs");
            } else {
                println!("Nothing to discard");
            }
        }
    }
    Ok(())
}

async fn services_command(ctx: &mut App, cmd: ServicesCommand) -> Result<()> {
    match cmd {
        ServicesCommand::List => {
            for s in &ctx.settings.services {
                let marker = if s.is_active { green("●") } else { dim("○") };
                let key = if s.has_credential() { green("key") } else { red("no key") };
                let origin = if s.is_built_in { "built-in" } else { "custom" };
                println!(
                    "{} {:<14} {:<16} {:<8} {:<8} {} {}",
                    marker,
                    s.id,
                    s.name,
                    s.kind,
                    origin,
                    key,
                    dim(&s.base_url)
                );
            }
            println!("\nModel: {}", bold(&ctx.settings.current_model));
            return Ok(());
        }
        ServicesCommand::Use { id } => ctx.settings.switch_active_service(&id)?,
        ServicesCommand::Key { id, key } => ctx.settings.update_service(
            &id,
            ServicePatch {
                api_key: Some(key),
                ..Default::default()
            },
        )?,
        ServicesCommand::Model { id, model } => ctx.settings.update_service(
            &id,
            ServicePatch {
                default_model: Some(model),
                ..Default::default()
            },
        )?,
        ServicesCommand::Add {
            name,
            url,
            key,
            models,
            gemini,
        } => {
            let id = ctx.settings.add_custom_service(ServiceDraft {
                name,
                kind: Some(if gemini { ServiceKind::Gemini } else { ServiceKind::Custom }),
                base_url: url,
                api_key: key,
                models,
                ..Default::default()
            })?;
            println!("Added {id}");
        }
        ServicesCommand::Remove { id } => {
            let removed = ctx.settings.remove_service(&id)?;
            println!("Removed {}", removed.name);
        }
        ServicesCommand::Test { id, timeout } => {
            let service = match &id {
                Some(id) => ctx.settings.service(id),
                None => ctx.settings.active_service(),
            }
            .context("No such service")?;
            let timeout = timeout
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| ctx.pipeline_config.connection_timeout());
            let report = test_connection(&reqwest::Client::new(), service, timeout).await;
            match &report.outcome {
                Ok(models) => println!(
                    "{} {} reachable in {}ms, {} model(s)",
                    green("✔"),
                    service.name,
                    report.latency_ms,
                    models.len()
                ),
                Err(e) => {
                    println!("{} {} ({}ms)", red("✘"), e, report.latency_ms);
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
    }
    ctx.settings_store
        .try_save(&ctx.settings)
        .context("Failed to save settings")
}

async fn presets_command(ctx: &mut App, cmd: PresetsCommand) -> Result<()> {
    match cmd {
        PresetsCommand::List => {
            for p in &ctx.settings.system_prompt_presets {
                let first = p.prompt.lines().next().unwrap_or_default();
                println!("{}  {:<20} {}", dim(&p.id), p.name, dim(first));
            }
            return Ok(());
        }
        PresetsCommand::Add { name, file } => {
            let prompt = match file {
                Some(path) => read_text(&path).await?,
                None => ctx.settings.system_prompt.clone(),
            };
            let id = ctx.settings.add_preset(&name, &prompt)?;
            println!("Saved {id}");
        }
        PresetsCommand::Remove { id } => {
            ctx.settings.remove_preset(&id)?;
        }
        PresetsCommand::Apply { id } => ctx.settings.apply_preset(&id)?,
    }
    ctx.settings_store
        .try_save(&ctx.settings)
        .context("Failed to save settings")
}

async fn settings_command(ctx: &mut App, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => {
            let s = &ctx.settings;
            println!("Service:       {}", s.active_service_id);
            println!("Model:         {}", s.current_model);
            println!("Temperature:   {}", s.temperature);
            println!("Output length: {}", s.output_length);
            println!("Streaming:     {}", s.stream);
            println!("Presets:       {}", s.system_prompt_presets.len());
            println!("\n{}\n{}", bold("System prompt:"), s.system_prompt);
            return Ok(());
        }
        SettingsCommand::Set {
            model,
            temperature,
            output_length,
            prompt_file,
            stream,
        } => {
            if let Some(model) = model {
                ctx.settings.current_model = model;
            }
            if let Some(t) = temperature {
                ctx.settings.set_temperature(t);
            }
            if let Some(n) = output_length {
                ctx.settings.set_output_length(n);
            }
            if let Some(path) = prompt_file {
                ctx.settings.system_prompt = read_text(&path).await?;
            }
            if let Some(stream) = stream {
                ctx.settings.stream = stream;
            }
        }
        SettingsCommand::ResetPrompt => ctx.settings.reset_system_prompt(),
        SettingsCommand::Reset => {
            ctx.settings = ctx.settings_store.reset();
            return Ok(());
        }
    }
    ctx.settings_store
        .try_save(&ctx.settings)
        .context("Failed to save settings")
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
