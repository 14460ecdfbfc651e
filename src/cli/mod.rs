//! # CLI Module
//!
//! Command-line interface for the archive deduplicator.
//!
//! ## Usage
//! ```bash
//! # Discover media and add it to the store
//! archive-dedup scan ~/Takeout ~/Phone
//!
//! # Merge records produced by an external metadata extractor
//! archive-dedup import records.json
//!
//! # Show what would happen, then do it
//! archive-dedup dedupe --dry-run
//! archive-dedup dedupe --on-conflict ask
//!
//! # Put quarantined files back
//! archive-dedup restore
//! ```

mod prompt;

use archive_dedup::core::engine::{
    default_state_dir, DedupEngine, EngineConfig, EngineConfigBuilder, RunSummary,
};
use archive_dedup::core::fsops::read_json;
use archive_dedup::core::record::FileRecord;
use archive_dedup::core::resolver::DeferResolver;
use archive_dedup::core::scanner::ScanConfig;
use archive_dedup::core::{DuplicateSet, PendingDecision};
use archive_dedup::error::{DedupError, Result};
use archive_dedup::events::{
    EngineEvent, EnginePhase, Event, EventChannel, EventSender, HashEvent, ScanEvent,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use prompt::ConsoleResolver;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Archive Dedup - collapse duplicate photos and videos, keep every bit of metadata
#[derive(Parser, Debug)]
#[command(name = "archive-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    state: StateArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct StateArgs {
    /// Directory holding the persisted state (defaults to the user data dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Where discarded duplicates are moved (defaults to <state-dir>/quarantine)
    #[arg(long, global = true)]
    quarantine_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan directories for photos and videos and add them to the store
    Scan {
        /// Directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,
    },

    /// Merge a JSON array of file records into the store
    Import {
        /// JSON file produced by a metadata extractor
        file: PathBuf,
    },

    /// Find duplicate sets and collapse them
    Dedupe {
        /// What to do with sets whose copies disagree on time or place
        #[arg(long, default_value = "defer")]
        on_conflict: ConflictPolicy,

        /// Only show what would happen
        #[arg(long)]
        dry_run: bool,

        /// Largest timestamp difference (seconds) still treated as the same moment
        #[arg(long, default_value = "5")]
        time_tolerance: u64,

        /// Largest distance (meters) still treated as the same place
        #[arg(long, default_value = "10")]
        geo_tolerance: f64,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Move quarantined files back to where they came from
    Restore {
        /// Original or quarantine paths to restore (default: everything)
        paths: Vec<PathBuf>,
    },

    /// Show what the store currently holds
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictPolicy {
    /// Leave conflicting sets for later (default)
    Defer,
    /// Ask which copy's metadata is right
    Ask,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let term = Term::stderr();

    match cli.command {
        Commands::Scan {
            paths,
            include_hidden,
        } => run_scan(&term, &cli.state, paths, include_hidden),
        Commands::Import { file } => run_import(&term, &cli.state, &file),
        Commands::Dedupe {
            on_conflict,
            dry_run,
            time_tolerance,
            geo_tolerance,
            output,
        } => {
            let config = engine_config(&cli.state)?
                .time_tolerance(Duration::from_secs(time_tolerance))
                .geo_tolerance_m(geo_tolerance)
                .build()?;
            if dry_run {
                run_plan(&term, config, output)
            } else {
                run_dedupe(&term, config, on_conflict, output)
            }
        }
        Commands::Restore { paths } => run_restore(&term, &cli.state, &paths),
        Commands::Status => run_status(&term, &cli.state),
    }
}

fn engine_config(args: &StateArgs) -> Result<EngineConfigBuilder> {
    let state_dir = args
        .state_dir
        .clone()
        .or_else(default_state_dir)
        .ok_or_else(|| {
            DedupError::Config("no data directory on this platform, pass --state-dir".to_string())
        })?;

    let mut builder = EngineConfig::builder(state_dir);
    if let Some(dir) = &args.quarantine_dir {
        builder = builder.quarantine_dir(dir);
    }
    Ok(builder)
}

fn open_engine(args: &StateArgs) -> Result<DedupEngine> {
    DedupEngine::open(engine_config(args)?.build()?)
}

fn header(term: &Term) {
    term.write_line(&format!(
        "{} {}",
        style("Archive Dedup").bold().cyan(),
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
    ))
    .ok();
    term.write_line("").ok();
}

/// Progress bar fed from engine events on a separate thread
fn spawn_progress(enabled: bool) -> (EventSender, JoinHandle<()>) {
    let (sender, receiver) = EventChannel::new();

    let progress = enabled.then(|| {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    });

    let handle = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress else { continue };
            match event {
                Event::Scan(ScanEvent::FileFound { path }) => {
                    pb.inc_length(1);
                    pb.inc(1);
                    pb.set_message(
                        path.file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
                Event::Scan(ScanEvent::Completed { .. }) => pb.finish_and_clear(),
                Event::Engine(EngineEvent::PhaseChanged { phase }) => {
                    if phase == EnginePhase::Resolving {
                        pb.finish_and_clear();
                    } else {
                        pb.set_message(phase.to_string());
                    }
                }
                Event::Hash(HashEvent::Started { total_files }) => {
                    pb.reset();
                    pb.set_length(total_files as u64);
                }
                Event::Hash(HashEvent::Progress(p)) => pb.set_position(p.completed as u64),
                Event::Engine(EngineEvent::Completed { .. }) => pb.finish_and_clear(),
                _ => {}
            }
        }
    });

    (sender, handle)
}

fn run_scan(term: &Term, args: &StateArgs, paths: Vec<PathBuf>, include_hidden: bool) -> Result<()> {
    header(term);
    let (sender, progress) = spawn_progress(true);
    let mut engine = open_engine(args)?.with_events(sender);

    let config = ScanConfig {
        include_hidden,
        ..ScanConfig::default()
    };
    let report = engine.scan(&paths, config);
    drop(engine);
    progress.join().ok();
    let report = report?;

    term.write_line(&format!(
        "{} Scan Complete",
        style("✓").green().bold()
    ))
    .ok();
    term.write_line(&format!(
        "  {} photos, {} videos",
        style(report.photos).cyan(),
        style(report.videos).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} new records, {} updated",
        style(report.ingest.inserted).cyan(),
        style(report.ingest.updated).cyan()
    ))
    .ok();
    for error in &report.errors {
        term.write_line(&format!("  {} {}", style("!").yellow(), error))
            .ok();
    }
    Ok(())
}

fn run_import(term: &Term, args: &StateArgs, file: &Path) -> Result<()> {
    let records: Vec<FileRecord> = read_json(file)?.ok_or_else(|| {
        DedupError::Config(format!("import file {} does not exist", file.display()))
    })?;

    let mut engine = open_engine(args)?;
    let stats = engine.ingest(records)?;

    term.write_line(&format!(
        "{} Imported {} new records, {} updated",
        style("✓").green().bold(),
        style(stats.inserted).cyan(),
        style(stats.updated).cyan()
    ))
    .ok();
    Ok(())
}

fn run_plan(term: &Term, config: EngineConfig, output: OutputFormat) -> Result<()> {
    let pretty = matches!(output, OutputFormat::Pretty);
    if pretty {
        header(term);
    }

    let (sender, progress) = spawn_progress(pretty);
    let mut engine = DedupEngine::open(config)?.with_events(sender);
    let detection = engine.find_duplicate_sets();
    let plan = detection
        .as_ref()
        .map(|d| engine.plan(&d.sets))
        .unwrap_or_default();
    drop(engine);
    progress.join().ok();
    let detection = detection?;

    match output {
        OutputFormat::Pretty => print_pretty_plan(term, &detection.sets, &plan),
        OutputFormat::Json => print_json_plan(&detection.sets, &plan),
    }
    Ok(())
}

fn run_dedupe(
    term: &Term,
    config: EngineConfig,
    policy: ConflictPolicy,
    output: OutputFormat,
) -> Result<()> {
    let pretty = matches!(output, OutputFormat::Pretty);
    if pretty {
        header(term);
    }

    let (sender, progress) = spawn_progress(pretty);
    let mut engine = DedupEngine::open(config)?.with_events(sender);
    let summary = match policy {
        ConflictPolicy::Defer => engine.run(&mut DeferResolver),
        ConflictPolicy::Ask => engine.run(&mut ConsoleResolver::new(term.clone())),
    };
    drop(engine);
    progress.join().ok();
    let summary = summary?;

    match output {
        OutputFormat::Pretty => print_pretty_summary(term, &summary),
        OutputFormat::Json => print_json_summary(&summary),
    }
    Ok(())
}

fn run_restore(term: &Term, args: &StateArgs, paths: &[PathBuf]) -> Result<()> {
    let mut engine = open_engine(args)?;
    let report = engine.restore_quarantined(paths)?;

    for (quarantined, original) in &report.restored {
        term.write_line(&format!(
            "  {} {} {} {}",
            style("↩").green(),
            display_path(quarantined),
            style("→").dim(),
            display_path(original)
        ))
        .ok();
    }
    for (path, error) in &report.failures {
        term.write_line(&format!(
            "  {} {}: {}",
            style("✗").red(),
            display_path(path),
            error
        ))
        .ok();
    }

    term.write_line(&format!(
        "{} Restored {} file(s), {} failed",
        style("✓").green().bold(),
        style(report.restored.len()).cyan(),
        report.failures.len()
    ))
    .ok();
    Ok(())
}

fn run_status(term: &Term, args: &StateArgs) -> Result<()> {
    let engine = open_engine(args)?;
    let status = engine.status();

    term.write_line(&format!(
        "{} {}",
        style("State:").bold(),
        engine.config().state_dir.display()
    ))
    .ok();
    term.write_line(&format!("  {} records", style(status.records).cyan()))
        .ok();
    term.write_line(&format!("  {} hashed", style(status.hashed).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} duplicate groups",
        style(status.duplicate_groups).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} quarantined in {}",
        style(status.quarantined).yellow(),
        engine.config().quarantine_dir.display()
    ))
    .ok();
    Ok(())
}

fn print_pretty_plan(term: &Term, sets: &[DuplicateSet], plan: &[PendingDecision]) {
    if sets.is_empty() {
        term.write_line(&format!("  {} No duplicates found!", style("✓").green()))
            .ok();
        return;
    }

    term.write_line(&format!(
        "{}",
        style("Duplicate Sets:").bold().underlined()
    ))
    .ok();
    term.write_line("").ok();

    for (i, (set, decision)) in sets.iter().zip(plan).enumerate() {
        match decision {
            PendingDecision::Automatic {
                keeper, discards, ..
            } => {
                term.write_line(&format!(
                    "  {} {} ({} copies, {})",
                    style(format!("Set {}:", i + 1)).bold(),
                    style("automatic").green(),
                    set.len(),
                    format_bytes(set.reclaimable_bytes())
                ))
                .ok();
                term.write_line(&format!("    {} {}", style("★").green(), display_path(keeper)))
                    .ok();
                for path in discards {
                    term.write_line(&format!("    {} {}", style("○").dim(), display_path(path)))
                        .ok();
                }
            }
            PendingDecision::NeedsManualChoice { clusters } => {
                term.write_line(&format!(
                    "  {} {} ({} copies in {} conflicting clusters)",
                    style(format!("Set {}:", i + 1)).bold(),
                    style("needs a decision").yellow(),
                    set.len(),
                    clusters.len()
                ))
                .ok();
                for (n, cluster) in clusters.iter().enumerate() {
                    term.write_line(&format!(
                        "    {} {}",
                        style(format!("[{}]", n + 1)).cyan(),
                        prompt::describe(&cluster.resolved())
                    ))
                    .ok();
                    for path in cluster.paths() {
                        term.write_line(&format!("        {}", display_path(&path)))
                            .ok();
                    }
                }
            }
        }
        term.write_line("").ok();
    }

    term.write_line(&format!(
        "{}",
        style("Dry run: nothing was moved or changed.").dim()
    ))
    .ok();
}

fn print_json_plan(sets: &[DuplicateSet], plan: &[PendingDecision]) {
    let output = serde_json::json!({
        "duplicate_sets": sets.len(),
        "sets": sets.iter().zip(plan).map(|(set, decision)| match decision {
            PendingDecision::Automatic { keeper, discards, .. } => serde_json::json!({
                "key": set.key(),
                "decision": "automatic",
                "keeper": keeper,
                "discards": discards,
            }),
            PendingDecision::NeedsManualChoice { clusters } => serde_json::json!({
                "key": set.key(),
                "decision": "manual",
                "clusters": clusters.iter().map(|c| c.paths()).collect::<Vec<_>>(),
            }),
        }).collect::<Vec<_>>()
    });

    println!("{:#}", output);
}

fn print_pretty_summary(term: &Term, summary: &RunSummary) {
    let stats = &summary.stats;
    term.write_line("").ok();
    term.write_line(&format!(
        "{} {}",
        style("✓").green().bold(),
        if summary.cancelled {
            "Run Cancelled"
        } else {
            "Run Complete"
        }
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicate sets found in {:.1}s",
        style(stats.sets_found).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} collapsed, {} failed, {} deferred, {} rejected",
        style(stats.sets_collapsed).green(),
        style(stats.sets_failed).red(),
        style(stats.sets_deferred).yellow(),
        style(stats.sets_rejected).red()
    ))
    .ok();
    term.write_line(&format!(
        "  {} files quarantined ({})",
        style(stats.files_quarantined).cyan(),
        style(format_bytes(stats.bytes_reclaimed)).yellow()
    ))
    .ok();

    for path in &summary.missing_files {
        term.write_line(&format!("  {} missing: {}", style("!").yellow(), display_path(path)))
            .ok();
    }
    for (path, error) in &summary.hash_failures {
        term.write_line(&format!(
            "  {} not hashed: {}: {}",
            style("!").yellow(),
            display_path(path),
            error
        ))
        .ok();
    }
    for (path, error) in &summary.move_failures {
        term.write_line(&format!(
            "  {} not moved: {}: {}",
            style("✗").red(),
            display_path(path),
            error
        ))
        .ok();
    }
    for error in &summary.rejections {
        term.write_line(&format!("  {} {}", style("✗").red(), error))
            .ok();
    }

    term.write_line("").ok();
    term.write_line(&format!(
        "{}",
        style("Nothing was deleted. `archive-dedup restore` puts quarantined files back.").dim()
    ))
    .ok();
}

fn print_json_summary(summary: &RunSummary) {
    let output = serde_json::json!({
        "stats": summary.stats,
        "cancelled": summary.cancelled,
        "duration_ms": summary.duration_ms,
        "deferred": summary.deferred,
        "missing_files": summary.missing_files,
        "hash_failures": summary.hash_failures.iter()
            .map(|(p, e)| serde_json::json!({ "path": p, "error": e.to_string() }))
            .collect::<Vec<_>>(),
        "move_failures": summary.move_failures.iter()
            .map(|(p, e)| serde_json::json!({ "path": p, "error": e.to_string() }))
            .collect::<Vec<_>>(),
        "rejections": summary.rejections.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    });

    println!("{:#}", output);
}

fn display_path(path: &Path) -> String {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(relative) => format!("~/{}", relative.display()),
        None => path.display().to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
