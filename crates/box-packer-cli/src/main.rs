use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use box_packer_core::config::{BranchBoundConfig, ExactConfig, PhysicsConfig};
use box_packer_core::{
    OccupancyRaster, PackInputObject, PackStats, PackerConfig, PackingContainer, PackingTask,
    PlacedObject, StrategyKind, TaskRunner, TaskStatus, build_packer, find_empty_areas,
    validate_layout,
};
use clap::{ArgAction, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "box-packer",
    about = "Pack rectangular boxes into a container",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show a spinner while packing (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a task file and write the placements as JSON
    Pack(PackArgs),
    /// Generate a random task file
    Gen(GenArgs),
    /// List the free rectangles of a grayscale occupancy image
    EmptyAreas(EmptyAreasArgs),
    /// Check a result file against its task
    Verify(VerifyArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    /// Task file (JSON: container + objects)
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Write placements here instead of stdout
    #[arg(short, long, help_heading = "Input/Output")]
    out: Option<PathBuf>,
    /// YAML or JSON config file (strategy, allow_rotation, physics, exact, branch_bound)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,

    /// Strategy: physics | exact | branch-and-bound | nfdh (overrides the config file)
    #[arg(short, long, help_heading = "Strategy")]
    strategy: Option<String>,
    /// Allow 90° rotations (overrides the config file)
    #[arg(long, action=ArgAction::Set, help_heading = "Strategy")]
    allow_rotation: Option<bool>,
    /// Seed for the physics strategy
    #[arg(long, help_heading = "Strategy")]
    seed: Option<u64>,
    /// Per-attempt time limit of the exact strategy (ms)
    #[arg(long, help_heading = "Strategy")]
    time_limit_ms: Option<u64>,
    /// Position lattice spacing of the branch-and-bound strategy
    #[arg(long, help_heading = "Strategy")]
    grid_step: Option<f64>,
    /// Cancel the task after this many milliseconds
    #[arg(long, help_heading = "Strategy")]
    timeout_ms: Option<u64>,

    /// Export packing stats (JSON) to this file
    #[arg(long, help_heading = "Export")]
    export_stats: Option<PathBuf>,
    /// Print the merged configuration (after CLI/config file) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
}

#[derive(Parser, Debug, Clone)]
struct GenArgs {
    /// Output task file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = 600.0)]
    width: f64,
    #[arg(long, default_value_t = 400.0)]
    height: f64,
    #[arg(long, default_value_t = 10.0)]
    padding: f64,
    /// Number of objects
    #[arg(short = 'n', long, default_value_t = 12)]
    count: u32,
    /// Smallest object side (mm)
    #[arg(long, default_value_t = 20)]
    min_side: u32,
    /// Largest object side (mm)
    #[arg(long, default_value_t = 150)]
    max_side: u32,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
struct EmptyAreasArgs {
    /// Grayscale (or color) image; bright pixels are free space
    input: PathBuf,
    /// Pixels at or above this value are free
    #[arg(long, default_value_t = box_packer_core::raster::DEFAULT_FREE_THRESHOLD)]
    threshold: u8,
    /// Hide rectangles smaller than this many cells
    #[arg(long, default_value_t = 1)]
    min_cells: u64,
    /// Also write the binarized occupancy image
    #[arg(long)]
    export_mask: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
struct VerifyArgs {
    /// Task file
    task: PathBuf,
    /// Placements produced by `pack`
    result: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args, cli.progress && !cli.quiet),
        Commands::Gen(args) => run_gen(args),
        Commands::EmptyAreas(args) => run_empty_areas(args),
        Commands::Verify(args) => run_verify(args),
    }
}

fn run_pack(cli: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => load_file_config(path)?.into_packer_config(PackerConfig::default())?,
        None => PackerConfig::default(),
    };
    if let Some(s) = &cli.strategy {
        cfg.strategy = parse_strategy(s)?;
    }
    if let Some(v) = cli.allow_rotation {
        cfg.allow_rotation = v;
    }
    if let Some(v) = cli.seed {
        cfg.physics.seed = Some(v);
    }
    if let Some(v) = cli.time_limit_ms {
        cfg.exact.time_limit_ms = v;
    }
    if let Some(v) = cli.grid_step {
        cfg.branch_bound.grid_step = v;
    }

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }
    cfg.validate()?;

    let task = read_task(&cli.input)?;
    task.validate()?;
    info!(
        objects = task.objects.len(),
        strategy = cfg.strategy.name(),
        "packing {}",
        cli.input.display()
    );

    let packer: Arc<dyn box_packer_core::Packer> = Arc::from(build_packer(&cfg));
    let mut runner = TaskRunner::new();
    let name = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("task")
        .to_string();
    runner.submit(name, task.clone(), packer)?;

    let bar = if show_progress {
        use indicatif::{ProgressBar, ProgressStyle};
        let b = ProgressBar::new_spinner();
        b.set_style(ProgressStyle::with_template(
            "{spinner:.green} packing [{elapsed_precise}] {wide_msg}",
        )?);
        b.set_message(cfg.strategy.name());
        Some(b)
    } else {
        None
    };

    let started = Instant::now();
    let timeout = cli.timeout_ms.map(Duration::from_millis);
    let outcome = loop {
        if let Some(outcome) = runner.wait(Duration::from_millis(100)) {
            break outcome;
        }
        if let Some(b) = &bar {
            b.tick();
        }
        if timeout.is_some_and(|t| started.elapsed() >= t) {
            runner.cancel();
            if let Some(b) = &bar {
                b.finish_and_clear();
            }
            bail!("packing cancelled after {}", fmt_dur(started.elapsed()));
        }
        if !runner.is_running() {
            bail!("packing stopped with status {:?}", runner.status());
        }
    };
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    let placed = match outcome.status {
        TaskStatus::Completed => outcome.result.unwrap_or_default(),
        status => bail!(
            "packing ended with status {:?}: {}",
            status,
            outcome.error.unwrap_or_default()
        ),
    };
    validate_layout(&task, &placed).context("strategy produced an invalid layout")?;

    let stats = PackStats::from_layout(&task, &placed);
    info!(elapsed = %fmt_dur(outcome.elapsed), "{}", stats.summary());
    if !stats.unplaced.is_empty() {
        warn!(ids = ?stats.unplaced, "objects left out");
    }

    let json = serde_json::to_string_pretty(&placed)?;
    match &cli.out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
            info!(?path, "placements written");
        }
        None => println!("{json}"),
    }
    if let Some(stats_path) = &cli.export_stats {
        fs::write(stats_path, serde_json::to_string_pretty(&stats)?)
            .with_context(|| format!("write {}", stats_path.display()))?;
        info!(?stats_path, "stats exported");
    }
    Ok(())
}

fn run_gen(args: &GenArgs) -> anyhow::Result<()> {
    if args.min_side == 0 || args.min_side > args.max_side {
        bail!(
            "invalid side range {}..={}",
            args.min_side,
            args.max_side
        );
    }
    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let objects = (1..=args.count)
        .map(|id| {
            let w = rng.gen_range(args.min_side..=args.max_side);
            let h = rng.gen_range(args.min_side..=args.max_side);
            PackInputObject::new(id, w as f64, h as f64)
        })
        .collect();
    let task = PackingTask::new(
        PackingContainer::new(args.width, args.height, args.padding),
        objects,
    );
    task.validate()?;
    let json = task.to_json_string()?;
    match &args.out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
            info!(?path, count = args.count, "task written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_empty_areas(args: &EmptyAreasArgs) -> anyhow::Result<()> {
    let img = image::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?
        .to_luma8();
    let raster = OccupancyRaster::from_image(&img, args.threshold);
    let rects: Vec<_> = find_empty_areas(&raster)
        .into_iter()
        .filter(|r| r.area() >= args.min_cells)
        .collect();
    info!(
        free_cells = raster.count_free(),
        rects = rects.len(),
        "{}x{} raster",
        raster.width(),
        raster.height()
    );
    println!("{}", serde_json::to_string_pretty(&rects)?);
    if let Some(path) = &args.export_mask {
        raster
            .to_image()
            .save(path)
            .with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

fn run_verify(args: &VerifyArgs) -> anyhow::Result<()> {
    let task = read_task(&args.task)?;
    let text = fs::read_to_string(&args.result)
        .with_context(|| format!("read {}", args.result.display()))?;
    let placed: Vec<PlacedObject> = serde_json::from_str(&text)
        .with_context(|| format!("parse {}", args.result.display()))?;
    validate_layout(&task, &placed)?;
    println!("ok: {}", PackStats::from_layout(&task, &placed).summary());
    Ok(())
}

fn read_task(path: &Path) -> anyhow::Result<PackingTask> {
    PackingTask::load(path).with_context(|| format!("load task {}", path.display()))
}

fn parse_strategy(s: &str) -> anyhow::Result<StrategyKind> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("unknown strategy '{s}' (expected physics|exact|branch-and-bound|nfdh)"))
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms >= 1.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{}µs", d.as_micros())
    }
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Partial configuration read from a file; unset fields keep their defaults.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    strategy: Option<String>,
    allow_rotation: Option<bool>,
    physics: Option<PhysicsConfig>,
    exact: Option<ExactConfig>,
    branch_bound: Option<BranchBoundConfig>,
}

impl FileConfig {
    fn into_packer_config(self, mut cfg: PackerConfig) -> anyhow::Result<PackerConfig> {
        if let Some(v) = self.strategy {
            cfg.strategy = parse_strategy(&v)?;
        }
        if let Some(v) = self.allow_rotation {
            cfg.allow_rotation = v;
        }
        if let Some(v) = self.physics {
            cfg.physics = v;
        }
        if let Some(v) = self.exact {
            cfg.exact = v;
        }
        if let Some(v) = self.branch_bound {
            cfg.branch_bound = v;
        }
        Ok(cfg)
    }
}

fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path.display()))?
    };
    Ok(cfg)
}
