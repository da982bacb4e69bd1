//! route-consolidator CLI - batch runner for the consolidation pipelines
//!
//! Usage:
//!   route-consolidator prepare <input> <output>
//!   route-consolidator routes <input> <output> [--checkpoint-dir <dir>] [--config <file>]
//!   route-consolidator points <input> <output> [--checkpoint-dir <dir>] [--config <file>]
//!   route-consolidator render <input> <output> [--points] [--unit-scale <s>]
//!   route-consolidator fetch <trips> <output> --api-key <key>   (feature `http`)
//!
//! Inputs and outputs are `;`-separated files; `render` writes GeoJSON.

use clap::{Parser, Subcommand};
use log::info;
use route_consolidator::{
    consolidate_points_with_checkpoints, consolidate_with_checkpoints, io, prepare_point_groups,
    render::{self, RenderOptions},
    ConsolidationConfig, CsvCheckpointer, NoCheckpoints, Route,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "route-consolidator")]
#[command(about = "Consolidate emission-annotated routes for map rendering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert upstream records to routes with derived intensity, without consolidating
    Prepare {
        /// Upstream route records
        input: PathBuf,
        /// Route output file
        output: PathBuf,
    },

    /// Consolidate routes into disjoint segments
    Routes {
        /// Upstream route records
        input: PathBuf,
        /// Route output file
        output: PathBuf,
        /// Write intermediate solutions to this directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Consolidate route points into a point cloud
    Points {
        /// Upstream route records
        input: PathBuf,
        /// Point output file
        output: PathBuf,
        /// Write intermediate solutions to this directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Export consolidated routes or points as GeoJSON
    Render {
        /// Route (or point, with --points) output file
        input: PathBuf,
        /// GeoJSON file to write
        output: PathBuf,
        /// Input is a point file
        #[arg(long)]
        points: bool,
        /// Divide intensities by this before display
        #[arg(long, default_value = "1.0")]
        unit_scale: f64,
    },

    /// Fetch driving directions for origin/destination trips
    #[cfg(feature = "http")]
    Fetch {
        /// Trip file (station_A_lat;station_A_long;station_B_lat;station_B_long;CO2)
        trips: PathBuf,
        /// Route record file to write
        output: PathBuf,
        /// Directions provider API key
        #[arg(long, env = "DIRECTIONS_API_KEY")]
        api_key: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Prepare { input, output } => run_prepare(&input, &output),
        Commands::Routes {
            input,
            output,
            checkpoint_dir,
            config,
        } => run_routes(&input, &output, checkpoint_dir, config.as_deref()),
        Commands::Points {
            input,
            output,
            checkpoint_dir,
            config,
        } => run_points(&input, &output, checkpoint_dir, config.as_deref()),
        Commands::Render {
            input,
            output,
            points,
            unit_scale,
        } => run_render(&input, &output, points, unit_scale),
        #[cfg(feature = "http")]
        Commands::Fetch {
            trips,
            output,
            api_key,
        } => run_fetch(&trips, &output, &api_key),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> route_consolidator::Result<ConsolidationConfig> {
    match path {
        Some(path) => ConsolidationConfig::from_json_file(path),
        None => Ok(ConsolidationConfig::default()),
    }
}

/// Checkpoints are named after the output file: `<dir>/<stem>_step_<n>.csv`.
fn checkpointer(dir: PathBuf, output: &Path) -> CsvCheckpointer {
    let prefix = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("solution")
        .to_string();
    CsvCheckpointer::new(dir, prefix)
}

fn load_routes(input: &Path) -> route_consolidator::Result<Vec<Route>> {
    let records = io::read_route_records(input)?;
    info!("Loaded {} route records from {}", records.len(), input.display());
    #[cfg(feature = "parallel")]
    let routes = route_consolidator::prepare_routes_parallel(&records);
    #[cfg(not(feature = "parallel"))]
    let routes = route_consolidator::prepare_routes(&records);
    Ok(routes)
}

fn run_prepare(input: &Path, output: &Path) -> route_consolidator::Result<()> {
    let routes = load_routes(input)?;
    io::write_routes(output, &routes)?;
    info!("Wrote {} routes to {}", routes.len(), output.display());
    Ok(())
}

fn run_routes(
    input: &Path,
    output: &Path,
    checkpoint_dir: Option<PathBuf>,
    config: Option<&Path>,
) -> route_consolidator::Result<()> {
    let config = load_config(config)?;
    let routes = load_routes(input)?;

    let solution = match checkpoint_dir {
        Some(dir) => consolidate_with_checkpoints(routes, &config, &mut checkpointer(dir, output)),
        None => consolidate_with_checkpoints(routes, &config, &mut NoCheckpoints),
    };

    io::write_routes(output, &solution)?;
    info!("Wrote {} segments to {}", solution.len(), output.display());
    Ok(())
}

fn run_points(
    input: &Path,
    output: &Path,
    checkpoint_dir: Option<PathBuf>,
    config: Option<&Path>,
) -> route_consolidator::Result<()> {
    let config = load_config(config)?;
    let records = io::read_route_records(input)?;
    let groups = prepare_point_groups(&records);

    let solution = match checkpoint_dir {
        Some(dir) => consolidate_points_with_checkpoints(groups, &config, &mut checkpointer(dir, output)),
        None => consolidate_points_with_checkpoints(groups, &config, &mut NoCheckpoints),
    };

    io::write_points(output, &solution)?;
    info!("Wrote {} points to {}", solution.len(), output.display());
    Ok(())
}

fn run_render(input: &Path, output: &Path, points: bool, unit_scale: f64) -> route_consolidator::Result<()> {
    let options = RenderOptions {
        unit_scale,
        ..Default::default()
    };
    let geojson = if points {
        render::points_to_geojson(&io::read_points(input)?, &options)
    } else {
        render::routes_to_geojson(&io::read_routes(input)?, &options)
    };

    let mut writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer(&mut writer, &geojson)?;
    writer.flush()?;
    info!("Wrote GeoJSON to {}", output.display());
    Ok(())
}

#[cfg(feature = "http")]
fn run_fetch(trips: &Path, output: &Path, api_key: &str) -> route_consolidator::Result<()> {
    let trips = route_consolidator::http::read_trip_records(trips)?;
    let results = route_consolidator::http::fetch_routes_blocking(api_key, trips, None)?;

    for failed in results.iter().filter(|r| !r.success) {
        eprintln!(
            "  [ERR] Trip {}: {}",
            failed.trip_index,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    let records: Vec<route_consolidator::RouteRecord> = results.into_iter().filter_map(|r| r.record).collect();
    io::write_route_records(output, &records)?;
    info!("Wrote {} route records to {}", records.len(), output.display());
    Ok(())
}
