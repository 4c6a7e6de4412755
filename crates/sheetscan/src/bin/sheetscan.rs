//! sheetscan CLI: scan answer sheets, render overlays, process scan buckets.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sheetscan::{
    render_overlay, BucketRunner, InputGeometry, JsonDirStore, SheetScanner, StabilityParams, Template,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheetscan")]
#[command(about = "Read filled bubbles from scanned answer sheets")]
#[command(version)]
struct Cli {
    /// More log output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one image and print or write the result JSON.
    Scan(ScanArgs),

    /// Draw every measured window on the canonical page.
    Overlay(OverlayArgs),

    /// Process every image currently in a bucket directory.
    Process(BucketArgs),

    /// Keep polling a bucket directory for new images.
    Watch {
        #[command(flatten)]
        bucket: BucketArgs,

        /// Poll interval in milliseconds.
        #[arg(long, default_value = "2000")]
        interval_ms: u64,
    },
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Input image.
    #[arg(long)]
    image: PathBuf,

    /// The image is already a canonical, upright page.
    #[arg(long)]
    canonical: bool,

    /// Write the result JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct OverlayArgs {
    #[arg(long)]
    template: PathBuf,

    #[arg(long)]
    image: PathBuf,

    #[arg(long)]
    canonical: bool,

    /// Output PNG.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct BucketArgs {
    #[arg(long)]
    template: PathBuf,

    /// Directory receiving scans; `success/` and `error/` are created inside.
    #[arg(long)]
    bucket: PathBuf,

    /// Directory of stored scan records.
    #[arg(long)]
    store: PathBuf,

    #[arg(long)]
    canonical: bool,

    /// Milliseconds between file size checks.
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    /// Give up on a file still being written after this many milliseconds.
    #[arg(long, default_value = "10000")]
    stable_timeout_ms: u64,
}

fn input_geometry(canonical: bool) -> InputGeometry {
    if canonical {
        InputGeometry::Canonical
    } else {
        InputGeometry::Raw
    }
}

fn load_scanner(path: &Path) -> CliResult<SheetScanner> {
    let template = Template::load_json(path)
        .map_err(|e| -> CliError { format!("failed to load template {}: {e}", path.display()).into() })?;
    log::info!("template {}", template.id());
    Ok(SheetScanner::new(template)?)
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(not(feature = "tracing"))]
    sheetscan::core::init_with_level(sheetscan::core::level_from_verbosity(cli.verbose, cli.quiet))?;
    // RUST_LOG drives the subscriber; -v/-q only affect the plain logger
    #[cfg(feature = "tracing")]
    {
        let _ = (cli.verbose, cli.quiet);
        sheetscan::init_tracing(false);
    }
    Ok(())
}

fn run(cli: &Cli) -> CliResult<()> {
    init_logging(cli)?;
    match &cli.command {
        Commands::Scan(args) => run_scan(args),
        Commands::Overlay(args) => run_overlay(args),
        Commands::Process(args) => run_process(args),
        Commands::Watch { bucket, interval_ms } => run_watch(bucket, Duration::from_millis(*interval_ms)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_scan(args: &ScanArgs) -> CliResult<()> {
    let scanner = load_scanner(&args.template)?;
    let result = scanner.scan_path(&args.image, input_geometry(args.canonical))?;
    let json = result.to_json_pretty()?;
    match &args.out {
        Some(out) => {
            fs::write(out, json)?;
            log::info!("wrote {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_overlay(args: &OverlayArgs) -> CliResult<()> {
    let scanner = load_scanner(&args.template)?;
    let img = image::open(&args.image)
        .map_err(|e| -> CliError { format!("failed to open image {}: {e}", args.image.display()).into() })?;
    let (page, _) = scanner.canonicalize(&img, input_geometry(args.canonical));
    let result = scanner.scan_canonical(&page);
    render_overlay(&page, scanner.template(), Some(&result)).save(&args.out)?;
    log::info!("wrote {}", args.out.display());
    Ok(())
}

fn bucket_runner(args: &BucketArgs) -> CliResult<BucketRunner<JsonDirStore>> {
    let scanner = load_scanner(&args.template)?;
    let store = JsonDirStore::open(&args.store)?;
    Ok(BucketRunner::new(scanner, store, &args.bucket)
        .with_input(input_geometry(args.canonical))
        .with_stability(StabilityParams {
            poll_interval: Duration::from_millis(args.poll_ms),
            timeout: Duration::from_millis(args.stable_timeout_ms),
        }))
}

fn run_process(args: &BucketArgs) -> CliResult<()> {
    let mut runner = bucket_runner(args)?;
    let processed = runner.process_existing()?;
    for p in &processed {
        let id = p.id.map_or_else(|| "-".to_owned(), |id| id.to_string());
        let note = p.error.as_deref().unwrap_or(if p.review_required { "review" } else { "" });
        println!("{id}\t{:?}\t{}\t{note}", p.status, p.destination.display());
    }
    Ok(())
}

fn run_watch(args: &BucketArgs, interval: Duration) -> CliResult<()> {
    let mut runner = bucket_runner(args)?;
    runner.watch(interval, || false)?;
    Ok(())
}
