//! strata CLI - slice STL files into a machine instruction stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use strata_math::Transform;
use strata_mesh::{combined_bounds, load_stl, TriangleMesh};
use strata_slicer::{OpenPathMode, PrintMesh, PrintPipeline, Stage};
use strata_toolpath::{estimate, JobAssembler, PrinterProfile};
use tracing::{debug, info};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Layer-based FFF toolpath planner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Slice meshes and write the instruction stream as JSON lines
    Slice {
        /// Solid STL files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Printer profile id, overriding the config
        #[arg(short, long)]
        profile: Option<String>,
        /// STL treated as explicit support
        #[arg(long)]
        support: Vec<PathBuf>,
        /// STL subtracted from the solids
        #[arg(long)]
        cavity: Vec<PathBuf>,
        /// STL whose sections are printed as open paths
        #[arg(long)]
        open: Vec<PathBuf>,
        /// How open paths interact with solids
        #[arg(long, value_enum, default_value_t = OpenMode::Embedded)]
        open_mode: OpenMode,
        /// Keep mesh coordinates instead of centring on the bed
        #[arg(long)]
        no_center: bool,
        /// Also write per-layer tool paths as JSON
        #[arg(long)]
        layers: Option<PathBuf>,
    },
    /// List built-in printer profiles
    Profiles,
    /// Print the default config as TOML
    Defaults,
}

#[derive(Clone, Copy, ValueEnum)]
enum OpenMode {
    Embedded,
    Clipped,
    Ignored,
}

impl From<OpenMode> for OpenPathMode {
    fn from(mode: OpenMode) -> Self {
        match mode {
            OpenMode::Embedded => OpenPathMode::Embedded,
            OpenMode::Clipped => OpenPathMode::Clipped,
            OpenMode::Ignored => OpenPathMode::Ignored,
        }
    }
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Slice {
            inputs,
            output,
            config,
            profile,
            support,
            cavity,
            open,
            open_mode,
            no_center,
            layers,
        } => {
            let config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            let printer = config.printer(profile.as_deref())?;

            let mut meshes = Vec::new();
            for path in &inputs {
                meshes.push(PrintMesh::solid(read_mesh(path)?));
            }
            for path in &support {
                meshes.push(PrintMesh::support(read_mesh(path)?));
            }
            for path in &cavity {
                meshes.push(PrintMesh::cavity(read_mesh(path)?));
            }
            for path in &open {
                meshes.push(PrintMesh::open_paths(read_mesh(path)?, open_mode.into()));
            }
            if !no_center {
                center_on_bed(&mut meshes, &printer)?;
            }

            slice(meshes, &config, printer, &output, layers.as_deref())?;
        }
        Commands::Profiles => {
            for p in PrinterProfile::all_profiles() {
                println!(
                    "{:<10} {:<20} {:>5.0} x {:>5.0} x {:>5.0} mm",
                    p.id, p.name, p.volume.x, p.volume.y, p.volume.z
                );
            }
        }
        Commands::Defaults => {
            print!("{}", Config::default_toml()?);
        }
    }

    Ok(())
}

fn read_mesh(path: &Path) -> Result<TriangleMesh> {
    let mesh = load_stl(path).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), triangles = mesh.num_triangles(), "loaded mesh");
    Ok(mesh)
}

/// Move all meshes together so their footprint is centred on the bed and the
/// lowest point rests on it.
fn center_on_bed(meshes: &mut [PrintMesh], printer: &PrinterProfile) -> Result<()> {
    let Some((min, max)) = combined_bounds(meshes.iter().map(|m| &m.mesh)) else {
        bail!("no triangles in the input meshes");
    };
    let center = printer.volume.bed_center();
    let shift = Transform::translation(
        center.x - (min[0] + max[0]) / 2.0,
        center.y - (min[1] + max[1]) / 2.0,
        -min[2],
    );
    for m in meshes {
        m.mesh.transform(&shift);
    }
    Ok(())
}

fn slice(
    meshes: Vec<PrintMesh>,
    config: &Config,
    printer: PrinterProfile,
    output: &Path,
    layers_out: Option<&Path>,
) -> Result<()> {
    let print = config.print_for(&printer)?;
    let mut pipeline = PrintPipeline::new(print.clone(), meshes);
    let mut stage = None;
    for progress in &mut pipeline {
        let progress = progress?;
        if progress.stage == Stage::Printing {
            debug!(layer = progress.current, total = progress.total, "printed layer");
        }
        if stage != Some(progress.stage) {
            info!(stage = ?progress.stage, total = progress.total, "stage");
            stage = Some(progress.stage);
        }
    }
    let layers = pipeline.into_output();

    if let Some(path) = layers_out {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), &layers)?;
    }

    let job = JobAssembler::new(printer, config.job.clone(), &print);
    let program = job.assemble(&layers)?;

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    for instruction in &program {
        serde_json::to_writer(&mut writer, instruction)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    println!("{}", estimate(&program));
    Ok(())
}
