//! biomesh CLI - biomolecular meshing command-line tool.
//!
//! Usage: biomesh [OPTIONS] <COMMAND> <INPUT> [OUTPUT]
//!
//! Run `biomesh --help` for available commands.

mod logging;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use biomesh::algo::coarsen::{coarsen, CoarsenOptions};
use biomesh::algo::quality::{angle_stats, min_face_area};
use biomesh::algo::refine::refine;
use biomesh::algo::smooth::{normal_smooth, smooth, SmoothOptions};
use biomesh::config::MeshConfig;
use biomesh::io::{self, Format};
use biomesh::mesh::{MeshStage, SurfaceMesh, VertexId};
use biomesh::pipeline::{self, SurfaceStatus};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "biomesh")]
#[command(author, version, about = "Biomolecular mesh generation CLI", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh the molecular surface of a PQR/PDB structure
    Surface {
        /// Input structure file (.pqr, .pdb)
        input: PathBuf,

        /// Output surface file (.off)
        output: PathBuf,

        /// Active-site file; tagged vertices are held fixed
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Isovalue of the extracted surface
        #[arg(long)]
        isovalue: Option<f32>,

        /// Volume samples per unit length
        #[arg(long)]
        dim_scale: Option<f64>,

        /// Coarsen/smooth rounds
        #[arg(long)]
        rounds: Option<usize>,
    },

    /// Build a tetrahedral finite-element mesh in a bounding sphere
    Volume {
        /// Input structure (.pqr, .pdb) or surface (.off)
        input: PathBuf,

        /// Output finite-element mesh (.m)
        output: PathBuf,

        /// Tetrahedralizer flags, e.g. "q2.0a10"
        #[arg(short = 'p', long)]
        tet_params: Option<String>,

        /// Bounding sphere radius relative to the molecule radius
        #[arg(long)]
        sphere_ratio: Option<f64>,

        /// Also save the merged boundary surface (.off)
        #[arg(long)]
        boundary: Option<PathBuf>,
    },

    /// Display surface statistics and angle diagnostics
    Info {
        /// Input surface file (.off)
        input: PathBuf,
    },

    /// Smooth a surface
    Smooth {
        /// Input surface file (.off)
        input: PathBuf,

        /// Output surface file (.off)
        output: PathBuf,

        /// Maximum number of passes
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Smoothing factor (0.0 to 1.0)
        #[arg(short, long)]
        lambda: Option<f64>,

        /// Use normal-based smoothing
        #[arg(long)]
        normal: bool,
    },

    /// Coarsen a surface by edge collapse
    Coarsen {
        /// Input surface file (.off)
        input: PathBuf,

        /// Output surface file (.off)
        output: PathBuf,

        /// Fraction of vertices to remove per pass
        #[arg(short, long)]
        rate: Option<f64>,

        /// Number of passes
        #[arg(short, long, default_value = "1")]
        passes: usize,
    },

    /// Split every triangle into four
    Refine {
        /// Input surface file (.off)
        input: PathBuf,

        /// Output surface file (.off)
        output: PathBuf,

        /// Number of refinement levels
        #[arg(short, long, default_value = "1")]
        iterations: usize,
    },

    /// Mesh the isosurface of a RAWIV volume
    Lattice {
        /// Input volume (.rawiv)
        input: PathBuf,

        /// Output surface file (.off)
        output: PathBuf,

        /// Isovalue of the extracted surface
        #[arg(long)]
        isovalue: Option<f32>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => MeshConfig::from_file(path)?,
        None => MeshConfig::default(),
    };

    match cli.command {
        Commands::Surface {
            input,
            output,
            sites,
            isovalue,
            dim_scale,
            rounds,
        } => {
            if let Some(v) = isovalue {
                config.isovalue = v;
            }
            if let Some(v) = dim_scale {
                config.dim_scale = v;
            }
            if let Some(v) = rounds {
                config.coarsen.rounds = v;
            }
            cmd_surface(&input, &output, sites.as_deref(), &config)?;
        }

        Commands::Volume {
            input,
            output,
            tet_params,
            sphere_ratio,
            boundary,
        } => {
            if let Some(v) = tet_params {
                config.tet_params = v;
            }
            if let Some(v) = sphere_ratio {
                config.sphere_ratio = v;
            }
            cmd_volume(&input, &output, boundary.as_deref(), &config)?;
        }

        Commands::Info { input } => {
            cmd_info(&input, &config)?;
        }

        Commands::Smooth {
            input,
            output,
            iterations,
            lambda,
            normal,
        } => {
            if let Some(v) = iterations {
                config.smooth.iterations = v;
            }
            if let Some(v) = lambda {
                config.smooth.lambda = v;
            }
            cmd_smooth(&input, &output, normal, &config)?;
        }

        Commands::Coarsen {
            input,
            output,
            rate,
            passes,
        } => {
            if let Some(v) = rate {
                config.coarsen.rate = v;
            }
            cmd_coarsen(&input, &output, passes, &config)?;
        }

        Commands::Refine {
            input,
            output,
            iterations,
        } => {
            cmd_refine(&input, &output, iterations)?;
        }

        Commands::Lattice {
            input,
            output,
            isovalue,
        } => {
            let isovalue = isovalue.unwrap_or(config.isovalue);
            cmd_lattice(&input, &output, isovalue, &config)?;
        }
    }

    Ok(())
}

/// Load and certify an OFF surface.
fn load_certified(input: &Path) -> CliResult<SurfaceMesh> {
    let mut mesh = io::load_surface(input)?;
    mesh.certify()?;
    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    Ok(mesh)
}

fn save(mesh: &mut SurfaceMesh, output: &Path) -> CliResult<()> {
    io::save_surface(mesh, output)?;
    mesh.promote(MeshStage::Exported)?;
    Ok(())
}

fn surface_from_structure(
    input: &Path,
    sites: Option<&Path>,
    config: &MeshConfig,
) -> CliResult<SurfaceMesh> {
    let atoms = io::load_atoms(input)?;
    let sites = match sites {
        Some(path) => io::load_sites(path)?,
        None => Vec::new(),
    };
    println!("Loaded: {} atoms, {} active sites", atoms.len(), sites.len());

    let outcome = pipeline::molecular_surface(&atoms, &sites, config)?;
    if outcome.status == SurfaceStatus::Empty {
        return Err(format!("no surface at isovalue {}", config.isovalue).into());
    }
    println!(
        "Surface: {} vertices, {} faces ({} islands removed, {} vertices tagged)",
        outcome.mesh.num_vertices(),
        outcome.mesh.num_faces(),
        outcome.islands.removed,
        outcome.tagged
    );
    Ok(outcome.mesh)
}

fn cmd_surface(
    input: &Path,
    output: &Path,
    sites: Option<&Path>,
    config: &MeshConfig,
) -> CliResult<()> {
    let start = Instant::now();
    let mut mesh = surface_from_structure(input, sites, config)?;
    let elapsed = start.elapsed();

    save(&mut mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}

fn cmd_volume(
    input: &Path,
    output: &Path,
    boundary: Option<&Path>,
    config: &MeshConfig,
) -> CliResult<()> {
    let start = Instant::now();
    let surface = match io::detect(input)? {
        format if format.is_structure() => surface_from_structure(input, None, config)?,
        Format::Off => load_certified(input)?,
        _ => return Err(format!("cannot build a volume from {}", input.display()).into()),
    };

    let mut outcome = pipeline::molecular_volume(&surface, config)?;
    let elapsed = start.elapsed();
    println!(
        "Result: {} vertices, {} tetrahedra (volume {:.3})",
        outcome.fe.num_vertices(),
        outcome.fe.num_simplices(),
        outcome.tets.volume()
    );

    io::mcsf::save(&outcome.fe, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    if let Some(path) = boundary {
        save(&mut outcome.boundary, path)?;
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn cmd_info(input: &Path, config: &MeshConfig) -> CliResult<()> {
    let mesh = load_certified(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Faces: {}", mesh.num_faces());
    println!("Surface area: {:.6}", mesh.surface_area());
    println!("Enclosed volume: {:.6}", mesh.signed_volume());
    if let Some(area) = min_face_area(&mesh) {
        println!("Smallest face area: {:.6}", area);
    }

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    if let Some((center, radius)) = mesh.center_radius() {
        println!(
            "Center: ({:.3}, {:.3}, {:.3}), radius {:.3}",
            center.x, center.y, center.z, radius
        );
    }
    println!("Average edge length: {:.6}", mesh.average_edge_length());
    println!("Euler characteristic: {}", mesh.euler_characteristic());

    let neighbors = mesh.neighbors()?;
    let boundary = (0..mesh.num_vertices())
        .filter(|&v| neighbors.is_boundary(VertexId::new(v)))
        .count();
    if boundary == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary vertices)", boundary);
    }

    let (lower, upper) = (config.smooth.min_angle, config.smooth.max_angle);
    let angles = angle_stats(&mesh, lower, upper);
    println!("\nAngles:");
    println!("  range: [{:.2}, {:.2}] degrees", angles.min_angle, angles.max_angle);
    println!("  below {}: {} faces", lower, angles.below);
    println!("  above {}: {} faces", upper, angles.above);
    Ok(())
}

fn cmd_smooth(input: &Path, output: &Path, normal: bool, config: &MeshConfig) -> CliResult<()> {
    let mut mesh = load_certified(input)?;
    let options = SmoothOptions::from_config(&config.smooth);

    let start = Instant::now();
    let report = if normal {
        println!("Applying normal smoothing ({} iterations)...", options.iterations);
        normal_smooth(&mut mesh, &options)?
    } else {
        println!(
            "Applying Laplacian smoothing ({} iterations, lambda={})...",
            options.iterations, options.lambda
        );
        smooth(&mut mesh, &options)?
    };
    let elapsed = start.elapsed();

    println!("Result: {} passes, {} moves", report.passes, report.moved);
    save(&mut mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}

fn cmd_coarsen(input: &Path, output: &Path, passes: usize, config: &MeshConfig) -> CliResult<()> {
    let mut mesh = load_certified(input)?;
    let options = CoarsenOptions::from_config(&config.coarsen);

    let start = Instant::now();
    for pass in 0..passes {
        let status = coarsen(&mut mesh, &options)?;
        println!("Pass {}: {:?}, {} faces", pass + 1, status, mesh.num_faces());
    }
    let elapsed = start.elapsed();

    println!("Result: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    save(&mut mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}

fn cmd_refine(input: &Path, output: &Path, iterations: usize) -> CliResult<()> {
    let mut mesh = load_certified(input)?;

    let start = Instant::now();
    for _ in 0..iterations {
        refine(&mut mesh)?;
    }
    let elapsed = start.elapsed();

    println!("Result: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    save(&mut mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}

fn cmd_lattice(input: &Path, output: &Path, isovalue: f32, config: &MeshConfig) -> CliResult<()> {
    let grid = io::rawiv::load(input)?;
    let (lo, hi) = grid.value_range();
    println!("Loaded: {:?} samples in [{}, {}]", grid.dims(), lo, hi);

    let start = Instant::now();
    let outcome = pipeline::lattice_surface(&grid, isovalue, config)?;
    let elapsed = start.elapsed();
    if outcome.status == SurfaceStatus::Empty {
        return Err(format!("no surface at isovalue {}", isovalue).into());
    }

    let mut mesh = outcome.mesh;
    println!("Result: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    save(&mut mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}
