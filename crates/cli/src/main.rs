//! Catchment CLI - parallel watershed delineation

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use catchment_algorithms::hydrology::{
    delineate_watersheds, DelineationReport, MarkerStrategy, WatershedParams,
};
use catchment_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use catchment_core::vector::parse_coords;
use catchment_core::{Direction, DirectionFormat, DirectionGrid, OutletSet, Raster};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "catchment")]
#[command(author, version, about = "Parallel watershed delineation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a flow direction raster
    Info {
        /// Input flow direction raster
        input: PathBuf,
        /// Direction encoding (auto, degree, degree45, power2)
        #[arg(short, long, default_value = "auto")]
        format: DirectionFormat,
    },
    /// Delineate the watersheds upstream of a set of outlets
    #[command(group(
        ArgGroup::new("seeds")
            .required(true)
            .args(["outlets", "outlets_file", "coords"])
    ))]
    Watershed {
        /// Input flow direction raster
        input: PathBuf,
        /// Output file (watershed ids, 0 = unassigned)
        output: PathBuf,
        /// Outlets as "row,col,id;row,col,id;..."
        #[arg(long)]
        outlets: Option<String>,
        /// File with one "row,col,id" outlet per line
        #[arg(long)]
        outlets_file: Option<PathBuf>,
        /// Outlets in map coordinates as "x,y,id;x,y,id;..."
        #[arg(long)]
        coords: Option<String>,
        /// Direction encoding (auto, degree, degree45, power2)
        #[arg(short, long, default_value = "auto")]
        format: DirectionFormat,
        /// Keep visited flags inside the direction grid instead of a
        /// separate array
        #[arg(long)]
        less_memory: bool,
        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_directions(path: &Path, format: DirectionFormat) -> Result<DirectionGrid> {
    let pb = spinner("Reading raster...");
    let raw: Raster<i32> = read_geotiff(path).context("Failed to read raster")?;
    let (grid, applied) =
        DirectionGrid::from_raster(&raw, format).context("Invalid flow direction raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {} ({} directions)", grid.cols(), grid.rows(), applied);
    Ok(grid)
}

fn write_result(raster: &Raster<u32>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn load_outlets(
    grid: &DirectionGrid,
    outlets: Option<String>,
    outlets_file: Option<PathBuf>,
    coords: Option<String>,
) -> Result<OutletSet> {
    let set = if let Some(text) = outlets {
        OutletSet::parse(&text).context("Invalid --outlets")?
    } else if let Some(path) = outlets_file {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        OutletSet::parse(&text).with_context(|| format!("Invalid outlets in {}", path.display()))?
    } else if let Some(text) = coords {
        let points = parse_coords(&text).context("Invalid --coords")?;
        OutletSet::from_coords(grid.transform(), grid.rows(), grid.cols(), &points)
            .context("Outlet outside the raster extent")?
    } else {
        anyhow::bail!("One of --outlets, --outlets-file or --coords is required");
    };

    if set.is_empty() {
        anyhow::bail!("At least one outlet is required");
    }
    Ok(set)
}

fn report_anomalies(report: &DelineationReport) {
    if report.skipped_nodata > 0 {
        info!("{} outlets on no-data cells were skipped", report.skipped_nodata);
    }
    if report.duplicate_outlets > 0 {
        warn!(
            "{} outlets share a cell with an earlier outlet and were ignored",
            report.duplicate_outlets
        );
    }
    if report.conflicts > 0 {
        warn!(
            "{} cells are reachable from more than one outlet; the flow network is not a forest",
            report.conflicts
        );
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input, format } => {
            let grid = read_directions(&input, format)?;
            let (rows, cols) = grid.shape();
            let histogram = grid.histogram();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, grid.len());
            println!("Cell size: {}", grid.transform().cell_size());
            println!("\nDirections:");
            for dir in Direction::ALL {
                println!("  {:>2} ({:>3}): {}", dir, dir.code(), histogram[dir.index()]);
            }
            println!(
                "  NoData: {} ({:.1}%)",
                histogram[8],
                100.0 * histogram[8] as f64 / grid.len().max(1) as f64
            );
        }

        // ── Watershed ────────────────────────────────────────────────
        Commands::Watershed {
            input,
            output,
            outlets,
            outlets_file,
            coords,
            format,
            less_memory,
            threads,
        } => {
            let mut grid = read_directions(&input, format)?;
            let outlets = load_outlets(&grid, outlets, outlets_file, coords)?;
            let params = WatershedParams {
                strategy: if less_memory {
                    MarkerStrategy::Packed
                } else {
                    MarkerStrategy::Separate
                },
                threads,
            };

            let start = Instant::now();
            let result = delineate_watersheds(&mut grid, &outlets, &params)
                .context("Failed to delineate watersheds")?;
            let elapsed = start.elapsed();

            report_anomalies(&result.report);
            info!(
                "{} outlets, {} cells assigned",
                result.report.outlets, result.report.assigned_cells
            );
            let raster = result.to_raster(grid.transform())?;
            write_result(&raster, &output)?;
            done("Watershed", &output, elapsed);
        }
    }

    Ok(())
}
