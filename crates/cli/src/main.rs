//! heldet CLI - NRCS Highly Erodible Land determinations

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use heldet_core::crs::CRS;
use heldet_core::io::{read_geojson, read_geotiff};
use heldet_core::vector::FeatureCollection;
use heldet_core::Raster;
use heldet_determination::{
    DeterminationInputs, DeterminationOrchestrator, DeterminationOutcome, DeterminationParams,
    DeterminationPath, ElevationSource, GeoTiffImageService, ProcessingContext, SoilLayer,
    Workspace, ZUnit,
};

#[derive(Parser)]
#[command(name = "heldet")]
#[command(author, version, about = "NRCS Highly Erodible Land determination", long_about = None)]
struct Cli {
    /// Field (CLU) polygons, GeoJSON
    #[arg(short, long)]
    fields: PathBuf,

    /// Soil layer(s) with MUHELCL and K/T/R attributes, GeoJSON
    #[arg(short, long, required = true, num_args = 1..)]
    soils: Vec<PathBuf>,

    /// Local DEM GeoTIFF; several files are mosaicked
    #[arg(short, long, num_args = 1.., conflicts_with = "image_service")]
    dem: Vec<PathBuf>,

    /// Geographic elevation GeoTIFF queried like an image service
    #[arg(long)]
    image_service: Option<PathBuf>,

    /// Elevation units: Meters, Feet, Centimeters or Inches
    #[arg(short, long)]
    z_units: Option<String>,

    /// Use the runoff LS equation
    #[arg(long)]
    runoff_ls: bool,

    /// EPSG code for vector layers without a crs member
    #[arg(long)]
    epsg: Option<u32>,

    /// JSON run configuration; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "hel_determination")]
    out_dir: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_layer(path: &Path, epsg: Option<u32>) -> Result<FeatureCollection> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let mut layer = read_geojson(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    if layer.crs.is_none() {
        layer.crs = epsg.map(CRS::from_epsg);
    }
    info!("{}: {} feature(s)", path.display(), layer.len());
    Ok(layer)
}

fn read_dem(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading DEM...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("DEM {}: {} x {}", path.display(), raster.cols(), raster.rows());
    Ok(raster)
}

fn load_params(cli: &Cli) -> Result<DeterminationParams> {
    let mut params = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid configuration {}", path.display()))?
        }
        None => DeterminationParams::default(),
    };
    if let Some(name) = &cli.z_units {
        match ZUnit::from_name(name) {
            Some(z) => params.z_units = Some(z),
            None => bail!("Unknown Z-units: {}", name),
        }
    }
    if cli.runoff_ls {
        params.use_runoff_ls = true;
    }
    Ok(params)
}

fn elevation_source(cli: &Cli) -> Result<Option<ElevationSource>> {
    if let Some(path) = &cli.image_service {
        let service = GeoTiffImageService::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        return Ok(Some(ElevationSource::ImageService(Box::new(service))));
    }
    match cli.dem.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(ElevationSource::Local(read_dem(single)?))),
        tiles => {
            let rasters = tiles.iter().map(|p| read_dem(p)).collect::<Result<Vec<_>>>()?;
            Ok(Some(ElevationSource::LocalTiles(rasters)))
        }
    }
}

fn summarize(outcome: &DeterminationOutcome) {
    let method = match outcome.path {
        DeterminationPath::NoPhel => "soil ratings (no PHEL)",
        DeterminationPath::ResolvedByThresholds => "soil ratings (area thresholds)",
        DeterminationPath::ErosionIndex => "erosion index",
    };
    println!("Tract {} / Farm {} determined by {}", outcome.tract, outcome.farm, method);
    for (clu, d) in &outcome.decisions {
        println!(
            "  CLU {:>4}: {:<4} {:>9.1} ac {:>6.1} %",
            clu.as_str(),
            d.rating.as_str(),
            d.acres,
            d.percent
        );
    }
    for path in &outcome.outputs {
        println!("  Saved: {}", path.display());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let params = load_params(&cli)?;
    let fields = read_layer(&cli.fields, cli.epsg)?;
    let soils = cli
        .soils
        .iter()
        .map(|p| Ok(SoilLayer::new(p.display().to_string(), read_layer(p, cli.epsg)?)))
        .collect::<Result<Vec<_>>>()?;
    let dem = elevation_source(&cli)?;

    let workspace = Workspace::create(&cli.out_dir)
        .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;
    let mut ctx = ProcessingContext::with_workspace(workspace);
    let inputs = DeterminationInputs { fields, soils, dem };

    let start = Instant::now();
    let outcome = DeterminationOrchestrator::new(params)
        .run(&mut ctx, &inputs)
        .context("HEL determination failed")?;
    let elapsed = start.elapsed();

    summarize(&outcome);
    println!("  Time: {:.2}s", elapsed.as_secs_f64());
    Ok(())
}
