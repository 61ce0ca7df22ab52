use clap::{Parser, Subcommand};
use optipress::config::{self, CompressionLevel, OptimizationConfig, Settings};
use optipress::delivery::{RenderContext, SizeVariant};
use optipress::history::{self, History, RunStats};
use optipress::optimize::{BatchJob, BatchOutcome, JobStatus, Optimizer};
use optipress::processors::FormatProcessor;
use optipress::types::ImageId;
use optipress::{backup, output};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "optipress")]
#[command(about = "Recompress web images in place, with backups and WebP siblings")]
#[command(long_about = "\
Recompress web images in place, with backups and WebP siblings

JPEG, PNG and WebP files are re-encoded in place. Before the first change a
pristine copy is stored next to the file, so 'revert' can always undo it:

  uploads/2024/
  ├── photo.jpg                   # optimized in place
  ├── photo.jpg.webp              # lossy WebP sibling (JPEG/PNG only)
  └── .backups/
      └── <id>/photo.jpg          # original, written once

Directories are walked recursively. Settings come from optipress.toml files
in the config root and any directory below it; deeper files win.

Run 'optipress gen-config' to generate a documented optipress.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding the root optipress.toml
    #[arg(long, default_value = ".", global = true)]
    config_root: PathBuf,

    /// Optimization history file [default: <config-root>/.optipress-history.json]
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct OptimizeArgs {
    /// Image files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Compression level: low, medium, high (anything else uses the fallbacks)
    #[arg(long)]
    level: Option<String>,

    /// Write WebP siblings even if the config disables them
    #[arg(long, overrides_with = "no_webp")]
    webp: bool,

    /// Never write WebP siblings
    #[arg(long, overrides_with = "webp")]
    no_webp: bool,

    /// Re-optimize files the history says are unchanged
    #[arg(long)]
    force: bool,

    /// Image identifier (single file only) [default: hash of the absolute path]
    #[arg(long)]
    id: Option<String>,
}

#[derive(clap::Args)]
struct RevertArgs {
    /// Image files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Image identifier used when the file was optimized (single file only)
    #[arg(long)]
    id: Option<String>,
}

#[derive(clap::Args)]
struct SelectArgs {
    /// Target display width in CSS pixels
    #[arg(long)]
    width: u32,

    /// Available variant as WIDTHxHEIGHT=FILE (repeatable)
    #[arg(long = "variant", value_parser = parse_variant, required = true)]
    variants: Vec<SizeVariant>,

    /// Position of the image on the page (1 = first)
    #[arg(long, default_value_t = 1)]
    position: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Recompress images in place
    Optimize(OptimizeArgs),
    /// Restore images from their backups and remove WebP siblings
    Revert(RevertArgs),
    /// Show size, type and dimensions of an image
    Inspect {
        path: PathBuf,
        /// Image identifier [default: hash of the absolute path]
        #[arg(long)]
        id: Option<String>,
    },
    /// Pick the variant to serve for a target width
    Select(SelectArgs),
    /// Print a stock optipress.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let history_path = cli
        .history
        .clone()
        .unwrap_or_else(|| cli.config_root.join(history::HISTORY_FILENAME));

    match cli.command {
        Command::Optimize(args) => {
            let root_settings = config::load_config(&cli.config_root)?;
            init_thread_pool(&root_settings.processing);
            run_optimize(&cli.config_root, &history_path, args)?;
        }
        Command::Revert(args) => run_revert(&history_path, args)?,
        Command::Inspect { path, id } => {
            let id = resolve_id(&path, id.as_deref());
            let image = Optimizer::new().inspect(&path, &id)?;
            output::print_inspect(&image);
        }
        Command::Select(args) => {
            let settings = config::load_config(&cli.config_root)?;
            let mut ctx = RenderContext::from_config(&settings.delivery);
            // Earlier images on the page only consume their priority slots.
            for _ in 1..args.position.max(1) {
                ctx.select(args.width, &args.variants);
            }
            let selection = ctx
                .select(args.width, &args.variants)
                .ok_or("no variants given")?;
            output::print_selection(&selection);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays the command's result.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("optipress=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// `1200x800=large.jpg` → variant named `large`.
fn parse_variant(raw: &str) -> Result<SizeVariant, String> {
    let (dims, file) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT=FILE, got '{raw}'"))?;
    let (w, h) = dims
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{dims}'"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if file.is_empty() {
        return Err("empty file name".into());
    }
    let name = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    Ok(SizeVariant::new(name, width, height, file))
}

/// Explicit `--id`, else a hash of the absolute path so ids survive `cd`.
fn resolve_id(path: &Path, explicit: Option<&str>) -> ImageId {
    match explicit {
        Some(id) => ImageId::new(id),
        None => {
            let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            history::path_id(&absolute)
        }
    }
}

/// `photo.jpg.webp` is a generated sibling, `photo.webp` is a source.
fn is_webp_sibling(path: &Path) -> bool {
    FormatProcessor::Webp.supports(path)
        && path
            .file_stem()
            .map(Path::new)
            .and_then(FormatProcessor::for_path)
            .is_some_and(FormatProcessor::produces_webp_sibling)
}

/// Expand directories into the images below them.
///
/// Explicit file arguments are kept as given, so an unsupported file is
/// reported rather than silently dropped. Duplicates are removed.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != backup::BACKUP_DIR)
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| FormatProcessor::for_path(p).is_some() && !is_webp_sibling(p));
            for file in walker {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        } else if seen.insert(path.clone()) {
            files.push(path.clone());
        }
    }
    files
}

fn require_single_for_id(files: &[PathBuf], id: Option<&str>) -> Result<(), String> {
    if id.is_some() && files.len() != 1 {
        return Err(format!("--id needs exactly one file, got {}", files.len()));
    }
    Ok(())
}

fn apply_overrides(mut settings: Settings, args: &OptimizeArgs) -> OptimizationConfig {
    if let Some(level) = &args.level {
        settings.optimization.compression_level =
            level.parse().unwrap_or(CompressionLevel::Custom);
    }
    if args.webp {
        settings.optimization.enable_webp = true;
    }
    if args.no_webp {
        settings.optimization.enable_webp = false;
    }
    settings.optimization
}

/// Settings hash used by the history, `None` for unsupported files.
fn params_hash(path: &Path, config: &OptimizationConfig) -> Option<String> {
    let processor = FormatProcessor::for_path(path)?;
    let webp = (config.enable_webp && processor.produces_webp_sibling())
        .then_some(config.webp_quality);
    Some(history::hash_params(processor.encoding(config), webp))
}

/// Jobs sharing one directory's settings.
struct Group {
    config: OptimizationConfig,
    jobs: Vec<BatchJob>,
}

fn run_optimize(
    config_root: &Path,
    history_path: &Path,
    args: OptimizeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_files(&args.paths);
    require_single_for_id(&files, args.id.as_deref())?;

    let mut history = History::load(history_path);
    let mut stats = RunStats::default();
    let mut index = 0;

    // Group by directory so each cascade is resolved once and every group
    // runs as one parallel batch.
    let mut groups: Vec<Group> = Vec::new();
    let mut group_of_dir: HashMap<PathBuf, usize> = HashMap::new();
    for path in files {
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let slot = match group_of_dir.get(&dir) {
            Some(&slot) => slot,
            None => {
                let settings = config::resolve_config_at(config_root, &dir)?;
                groups.push(Group {
                    config: apply_overrides(settings, &args),
                    jobs: Vec::new(),
                });
                group_of_dir.insert(dir, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];

        if !args.force {
            let unchanged = params_hash(&path, &group.config).is_some_and(|params| {
                history::hash_file(&path)
                    .is_ok_and(|content| history.is_current(&path, &content, &params))
            });
            if unchanged {
                index += 1;
                stats.unchanged += 1;
                output::print_skipped(index, &path, "unchanged since last run");
                continue;
            }
        }

        let id = resolve_id(&path, args.id.as_deref());
        group.jobs.push(BatchJob { path, id });
    }

    let optimizer = Optimizer::new();
    let mut aborted = false;
    for group in groups {
        let outcomes: Vec<BatchOutcome> = if aborted {
            group
                .jobs
                .into_iter()
                .map(|job| BatchOutcome {
                    job,
                    status: JobStatus::Skipped,
                })
                .collect()
        } else {
            optimizer.optimize_batch(group.jobs, &group.config)
        };

        for outcome in outcomes {
            index += 1;
            let path = &outcome.job.path;
            match outcome.status {
                JobStatus::Optimized(result) => {
                    stats.optimized += 1;
                    stats.bytes_saved += result.savings;
                    output::print_optimize_result(index, &result);
                    match (history::hash_file(path), params_hash(path, &group.config)) {
                        (Ok(content), Some(params)) => history.record(&result, content, params),
                        (Err(e), _) => {
                            warn!(path = %path.display(), "not recorded in history: {e}")
                        }
                        _ => {}
                    }
                }
                JobStatus::Failed(err) => {
                    stats.failed += 1;
                    aborted |= err.kind().is_fatal();
                    output::print_failure(index, path, &err);
                }
                JobStatus::Skipped => {
                    stats.skipped += 1;
                    output::print_skipped(index, path, "stopped after a fatal error");
                }
            }
        }
    }

    history.save(history_path)?;
    output::print_summary(&stats, history.len(), history.total_savings());

    if stats.failed > 0 {
        return Err(format!("{} file(s) failed", stats.failed).into());
    }
    Ok(())
}

fn run_revert(history_path: &Path, args: RevertArgs) -> Result<(), Box<dyn std::error::Error>> {
    let files: Vec<PathBuf> = collect_files(&args.paths);
    require_single_for_id(&files, args.id.as_deref())?;

    let optimizer = Optimizer::new();
    let mut history = History::load(history_path);
    let mut failed = 0;

    for (i, path) in files.iter().enumerate() {
        let id = resolve_id(path, args.id.as_deref());
        match optimizer.revert(path, &id) {
            Ok(result) => {
                history.forget(path);
                output::print_revert(i + 1, &result);
            }
            Err(err) => {
                failed += 1;
                output::print_failure(i + 1, path, &err);
            }
        }
    }

    history.save(history_path)?;
    if failed > 0 {
        return Err(format!("{failed} file(s) could not be reverted").into());
    }
    Ok(())
}
