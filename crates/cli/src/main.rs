//! Landsight CLI - recipe-driven remote-sensing runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use landsight_algorithms::imagery::{add_index, IndexFormula, IndexSpec};
use landsight_colormap::{auto_params, render_band, ColorScheme};
use landsight_core::export::LocalExporter;
use landsight_core::io::{read_image, write_image};
use landsight_core::raster::Image;
use landsight_core::vector::{AdminLevel, BoundaryDataset, BoundarySchema};
use landsight_pipeline::{run_many, Pipeline, ProcessingMode, Recipe, RunReport};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "landsight")]
#[command(author, version, about = "Recipe-driven satellite imagery analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more recipes
    Run {
        /// Recipe TOML files
        #[arg(required = true)]
        recipes: Vec<PathBuf>,
        /// Directory for exports, previews and reports
        #[arg(short, long, default_value = "landsight_out")]
        output: PathBuf,
        /// Byte quota for the output directory
        #[arg(long)]
        quota: Option<u64>,
        /// Recipes run at once (0 = all cores)
        #[arg(short, long, default_value = "1")]
        jobs: usize,
    },
    /// Parse and check a recipe without running it
    Validate {
        /// Recipe TOML file
        recipe: PathBuf,
    },
    /// Show the bands of a GeoTIFF
    Info {
        /// Input GeoTIFF
        input: PathBuf,
    },
    /// List unit names in a boundary dataset
    Regions {
        /// GeoJSON FeatureCollection
        boundaries: PathBuf,
        /// Attribute preset: gaul, ghs, geoboundaries
        #[arg(short, long, default_value = "gaul")]
        schema: String,
        /// Administrative level: country, region, district
        #[arg(short, long, default_value = "district")]
        level: String,
        /// Only units of this country
        #[arg(short, long)]
        country: Option<String>,
    },
    /// Add a spectral index band to a multi-band GeoTIFF
    Index {
        /// Input GeoTIFF with named bands
        input: PathBuf,
        /// Output GeoTIFF
        output: PathBuf,
        /// Name of the new band
        #[arg(short, long)]
        name: String,
        /// Normalized difference of two bands, e.g. `SR_B6,SR_B5`
        #[arg(long, conflicts_with = "expression")]
        nd: Option<String>,
        /// Band expression, e.g. `2.5 * (B8 - B4) / (B8 + 2.4 * B4 + 1)`
        #[arg(short, long)]
        expression: Option<String>,
    },
    /// Render one band to an RGBA preview TIFF
    Render {
        /// Input GeoTIFF
        input: PathBuf,
        /// Output TIFF
        output: PathBuf,
        /// Band to render (default: first)
        #[arg(short, long)]
        band: Option<String>,
        /// Stretch minimum (default: band minimum)
        #[arg(long)]
        min: Option<f64>,
        /// Stretch maximum (default: band maximum)
        #[arg(long)]
        max: Option<f64>,
        /// Palette: grayscale, vegetation, water, built_up, temperature, night_lights, land_cover
        #[arg(short, long, default_value = "grayscale")]
        scheme: String,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
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

fn load_recipe(path: &Path) -> Result<Recipe> {
    let recipe = Recipe::from_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
    recipe
        .validate()
        .with_context(|| format!("Invalid recipe {}", path.display()))?;
    Ok(recipe)
}

fn read_input(path: &Path) -> Result<Image> {
    let pb = spinner("Reading raster...");
    let id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let image = read_image(path, id).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} band(s)", image.band_names().len());
    Ok(image)
}

/// Parse a snake_case value the way recipes spell it
fn parse_label<T: serde::de::DeserializeOwned>(kind: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .with_context(|| format!("Unknown {}: {}", kind, value))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn print_report(report: &RunReport) {
    println!("Recipe: {} ({})", report.recipe, report.region);
    let b = report.region_bbox;
    println!(
        "  Region bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        b.min_x, b.min_y, b.max_x, b.max_y
    );
    for w in &report.windows {
        println!(
            "  Window {} [{}]: {} image(s) used of {} found",
            w.window, w.dates, w.images_used, w.images_found
        );
        for layer in &w.layers {
            match &layer.stats {
                Some(s) => println!(
                    "    {}: mean {:.4}, min {:.4}, max {:.4} over {} pixel(s)",
                    layer.name, s.mean, s.min, s.max, s.count
                ),
                None => println!("    {}: no valid pixels in region", layer.name),
            }
        }
        if let Some(h) = &w.class_histogram {
            println!("    classes: {:?}", h);
        }
        for e in &w.exports {
            println!("    export: {} ({} x {}, {} band(s))", e.path.display(), e.cols, e.rows, e.bands);
        }
        if let Some(p) = &w.preview {
            println!("    preview: {}", p.display());
        }
    }
    if let Some(c) = &report.change {
        println!(
            "  Change in {} {} -> {}: {} decrease, {} stable, {} increase",
            c.band, c.before, c.after, c.summary.decrease, c.summary.no_change, c.summary.increase
        );
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            recipes,
            output,
            quota,
            jobs,
        } => {
            let recipes = recipes
                .iter()
                .map(|p| load_recipe(p))
                .collect::<Result<Vec<_>>>()?;
            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;

            let mut exporter = LocalExporter::new(&output);
            if let Some(q) = quota {
                exporter = exporter.with_quota(q);
            }
            let exporter = Arc::new(exporter);

            let start = Instant::now();
            let pb = spinner(&format!("Running {} recipe(s)...", recipes.len()));
            let outcomes = run_many(&recipes, ProcessingMode::from_jobs(jobs), |recipe| {
                Ok(Pipeline::for_recipe(recipe)?
                    .with_exporter(exporter.clone())
                    .with_output_dir(&output))
            })?;
            pb.finish_and_clear();

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) => {
                        print_report(report);
                        let path = output.join(format!("{}_report.json", report.recipe));
                        std::fs::write(&path, report.to_json()?)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("Recipe {} failed: {}", outcome.recipe, e);
                    }
                }
            }
            println!("  Processing time: {:.2?}", start.elapsed());
            if failed > 0 {
                anyhow::bail!("{} of {} recipe(s) failed", failed, outcomes.len());
            }
        }

        Commands::Validate { recipe } => {
            let r = load_recipe(&recipe)?;
            println!("{}: ok", recipe.display());
            println!("  Region: {} / {}", r.region.country, r.region.names.join(", "));
            println!("  Collection: {}", r.selection.collection);
            for w in &r.windows {
                println!("  Window {}: {} .. {}", w.name, w.start, w.end);
            }
            let names: Vec<&str> = r.indices.iter().map(|s| s.name.as_str()).collect();
            if !names.is_empty() {
                println!("  Indices: {}", names.join(", "));
            }
        }

        Commands::Info { input } => {
            let image = read_input(&input)?;
            println!("File: {}", input.display());
            if let Some(grid) = image.grid() {
                let (rows, cols) = grid.shape();
                let bounds = grid.bounds();
                println!("Dimensions: {} x {} ({} cells)", cols, rows, grid.len());
                println!("Cell size: {}", grid.cell_size());
                println!(
                    "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    bounds.0, bounds.1, bounds.2, bounds.3
                );
                if let Some(crs) = grid.crs() {
                    println!("CRS: {}", crs);
                }
            }
            println!("\nBands:");
            for name in image.band_names() {
                let band = image.band(name)?;
                let stats = band.statistics();
                print!("  {}:", name);
                if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                    print!(" min {:.4}, max {:.4}, mean {:.4},", min, max, mean);
                }
                println!(
                    " valid {:.1}%",
                    100.0 * stats.valid_count as f64 / band.len().max(1) as f64
                );
            }
        }

        Commands::Regions {
            boundaries,
            schema,
            level,
            country,
        } => {
            let level: AdminLevel = parse_label("level", &level)?;
            let schema = BoundarySchema::from_label(&schema, level)?;
            let dataset = BoundaryDataset::from_geojson(&boundaries, schema)
                .with_context(|| format!("Failed to read {}", boundaries.display()))?;
            let names = dataset.names(country.as_deref());
            for name in &names {
                println!("{}", name);
            }
            if let Some(c) = &country {
                if let Some(b) = dataset.country_extent(c) {
                    info!(
                        "{} unit(s) in {}, extent ({:.4}, {:.4}) - ({:.4}, {:.4})",
                        names.len(),
                        c,
                        b.min_x,
                        b.min_y,
                        b.max_x,
                        b.max_y
                    );
                }
            }
        }

        Commands::Index {
            input,
            output,
            name,
            nd,
            expression,
        } => {
            let formula = match (nd, expression) {
                (Some(pair), _) => {
                    let (a, b) = pair
                        .split_once(',')
                        .context("--nd expects two bands separated by a comma")?;
                    IndexFormula::normalized_difference(a.trim(), b.trim())
                }
                (None, Some(expr)) => IndexFormula::expression(expr),
                (None, None) => anyhow::bail!("Give either --nd or --expression"),
            };
            let spec = IndexSpec::new(name, formula);
            spec.validate()?;

            let image = read_input(&input)?;
            let start = Instant::now();
            let out = add_index(&image, &spec)?;
            let elapsed = start.elapsed();
            write_image(&out.select(&[spec.name.as_str()])?, &output).context("Failed to write output")?;
            done(&spec.name, &output, elapsed);
        }

        Commands::Render {
            input,
            output,
            band,
            min,
            max,
            scheme,
        } => {
            let image = read_input(&input)?;
            let name = match band {
                Some(b) => b,
                None => image
                    .band_names()
                    .first()
                    .map(|s| s.to_string())
                    .context("Input has no bands")?,
            };
            let raster = image.band(&name)?;
            let scheme: ColorScheme = parse_label("scheme", &scheme)?;

            let auto = auto_params(raster);
            let mut vis = auto.clone().with_scheme(scheme);
            vis.min = min.unwrap_or(auto.min);
            vis.max = max.unwrap_or(auto.max);

            let start = Instant::now();
            let rgba = render_band(raster, &vis)?;
            rgba.write_tiff(&output).context("Failed to write output")?;
            done("Preview", &output, start.elapsed());
        }
    }

    Ok(())
}
