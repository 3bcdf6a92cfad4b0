//! Tessera CLI - mesh processing from the command line.
//!
//! Usage: tessera [-v] <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `tessera --help` for available commands. Log output goes to stderr
//! and follows `RUST_LOG`; each `-v` raises the default level.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use tessera::algo::components::{extract_components, label_components, topology_info};
use tessera::algo::curvature::{compute_curvature, CurvatureOptions, CurvatureResult};
use tessera::algo::fair::{fair, FairOptions};
use tessera::algo::features::{clear_features, detect_angle, detect_boundary};
use tessera::algo::geodesic::{compute_geodesics, GeodesicOptions};
use tessera::algo::hole_fill::{fill_holes, HoleFillOptions};
use tessera::algo::laplace::LaplaceWeighting;
use tessera::algo::parameterize::{parameterize, BoundaryShape, Method, ParameterizeOptions};
use tessera::algo::polygonize::{polygonize, PolygonizeOptions};
use tessera::algo::progress::Progress;
use tessera::algo::remesh::{remesh, RemeshOptions};
use tessera::algo::sample::{sample, SampleOptions};
use tessera::algo::simplify::{simplify, SimplifyOptions};
use tessera::algo::smooth::{explicit_smooth, implicit_smooth, SmoothOptions};
use tessera::algo::stitch::{stitch, StitchOptions};
use tessera::algo::subdivide::{catmull_clark_subdivide, loop_subdivide, sqrt3_subdivide, SubdivideOptions};
use tessera::algo::triangulate::{triangulate, Objective, TriangulateOptions};
use tessera::io;
use tessera::mesh::{HalfEdgeMesh, VertexId};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Halfedge mesh processing CLI", long_about = None)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print counts, topology and geometry statistics
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// List connected components with their topological type
    Components {
        /// Input mesh file
        input: PathBuf,
    },

    /// Print principal curvature statistics
    Curvature {
        /// Input mesh file
        input: PathBuf,

        /// Smoothing passes over the curvature values
        #[arg(short, long, default_value = "0")]
        smoothing_steps: usize,

        /// Use a one-ring instead of a two-ring neighbourhood
        #[arg(long)]
        one_ring: bool,
    },

    /// Laplacian smoothing
    Smooth {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Explicit (iterative) or implicit (one linear solve)
        #[arg(short, long, value_enum, default_value = "explicit")]
        method: SmoothMethod,

        /// Number of explicit iterations
        #[arg(short, long, default_value = "10")]
        iterations: usize,

        /// Explicit step size in (0, 1]
        #[arg(short, long, default_value = "0.5")]
        lambda: f64,

        /// Implicit time step
        #[arg(short, long, default_value = "0.001")]
        timestep: f64,

        /// Use uniform instead of cotangent weights
        #[arg(long)]
        uniform: bool,

        /// Allow border vertices to move
        #[arg(long)]
        move_boundary: bool,

        /// Single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Minimize a Laplacian energy over the interior vertices
    Fair {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Energy order: 1 area, 2 curvature, 3 curvature variation
        #[arg(short = 'k', long, default_value = "2")]
        order: usize,

        /// Single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Isotropic remeshing
    Remesh {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Target edge length (default: mean edge length)
        #[arg(short = 'l', long)]
        target_length: Option<f64>,

        /// Curvature-adaptive sizing with this approximation error
        #[arg(long)]
        adaptive_error: Option<f64>,

        /// Number of iterations
        #[arg(short, long, default_value = "10")]
        iterations: usize,

        /// Preserve edges with a dihedral angle above this many degrees
        #[arg(long)]
        feature_angle: Option<f64>,

        /// Single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Quadric error simplification
    Simplify {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Target vertex count
        #[arg(short = 'n', long, conflicts_with = "ratio")]
        vertices: Option<usize>,

        /// Fraction of vertices to keep
        #[arg(short, long, default_value = "0.5")]
        ratio: f64,

        /// Smallest acceptable triangle aspect ratio
        #[arg(long)]
        aspect_ratio: Option<f64>,

        /// Largest allowed normal deviation in degrees
        #[arg(long)]
        normal_deviation: Option<f64>,

        /// Allow border vertices to be removed
        #[arg(long)]
        collapse_boundary: bool,
    },

    /// Subdivision surfaces
    Subdivide {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Subdivision scheme
        #[arg(short, long, value_enum, default_value = "loop")]
        method: SubdivideMethod,

        /// Number of subdivision iterations
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Close holes
    FillHoles {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Largest hole, in border edges
        #[arg(short, long, default_value = "500")]
        max_size: usize,

        /// Keep the minimal triangulation without refinement and fairing
        #[arg(long)]
        no_refine: bool,
    },

    /// Weld coincident borders
    Stitch {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Largest distance between welded endpoints
        #[arg(short, long, default_value = "1e-6")]
        tolerance: f64,

        /// Reverse pieces with inconsistent orientation first
        #[arg(long)]
        merge_components: bool,
    },

    /// Flatten a disc-like surface; texture coordinates go to the output
    Parameterize {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file (OBJ keeps the texture coordinates)
        output: PathBuf,

        /// Parameterization method
        #[arg(short, long, value_enum, default_value = "harmonic")]
        method: ParamMethod,

        /// Map the border to a square instead of a circle (harmonic only)
        #[arg(long)]
        square: bool,
    },

    /// Split polygons into triangles
    Triangulate {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Quality objective
        #[arg(short, long, value_enum, default_value = "min-area")]
        objective: TriangulateObjective,
    },

    /// Draw random points on the surface
    Sample {
        /// Input mesh file
        input: PathBuf,

        /// Output point file (PLY or OBJ, vertices only)
        output: PathBuf,

        /// Number of points
        #[arg(short = 'n', long, default_value = "10000")]
        count: usize,

        /// RNG seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Merge coplanar faces into polygons
    Polygonize {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Coplanarity threshold in degrees
        #[arg(short, long, default_value = "1.0")]
        angle: f64,

        /// Keep straight valence-2 vertices on polygon sides
        #[arg(long)]
        keep_straight_vertices: bool,
    },

    /// Count feature edges
    Features {
        /// Input mesh file
        input: PathBuf,

        /// Dihedral angle threshold in degrees
        #[arg(short, long, default_value = "44.0")]
        angle: f64,

        /// Also mark border edges
        #[arg(long)]
        boundary: bool,
    },

    /// Geodesic distances from seed vertices
    Geodesic {
        /// Input mesh file
        input: PathBuf,

        /// Seed vertex indices
        #[arg(short, long, required = true, num_args = 1..)]
        seeds: Vec<usize>,

        /// Stop the front at this distance
        #[arg(long)]
        max_distance: Option<f64>,

        /// Stop after reaching this many vertices
        #[arg(long)]
        max_vertices: Option<usize>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SmoothMethod {
    /// Iterated weighted averaging
    Explicit,
    /// Backward Euler step of the Laplacian flow
    Implicit,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SubdivideMethod {
    /// Loop (triangle meshes)
    Loop,
    /// Catmull-Clark (any polygon mesh)
    CatmullClark,
    /// Kobbelt √3 (triangle meshes)
    Sqrt3,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ParamMethod {
    /// Discrete harmonic map with a fixed border
    Harmonic,
    /// Least squares conformal map with a free border
    Lscm,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TriangulateObjective {
    /// Minimize total triangle area
    MinArea,
    /// Minimize the largest angle
    MaxAngle,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> CliResult {
    match command {
        Commands::Info { input } => cmd_info(&input),
        Commands::Components { input } => cmd_components(&input),
        Commands::Curvature {
            input,
            smoothing_steps,
            one_ring,
        } => cmd_curvature(&input, smoothing_steps, one_ring),
        Commands::Smooth {
            input,
            output,
            method,
            iterations,
            lambda,
            timestep,
            uniform,
            move_boundary,
            sequential,
        } => {
            let mut options = SmoothOptions::default()
                .with_iterations(iterations)
                .with_lambda(lambda)
                .with_timestep(timestep)
                .with_weighting(weighting(uniform))
                .with_parallel(!sequential);
            if move_boundary {
                options = options.allow_boundary_movement();
            }
            transform(&input, &output, "smoothing", |mesh| match method {
                SmoothMethod::Explicit => Ok(explicit_smooth(mesh, &options)?),
                SmoothMethod::Implicit => Ok(implicit_smooth(mesh, &options)?),
            })
        }
        Commands::Fair {
            input,
            output,
            order,
            sequential,
        } => transform(&input, &output, "fairing", |mesh| {
            let options = FairOptions::order(order)
                .with_parallel(!sequential)
                .with_progress(create_progress());
            let report = fair(mesh, &options)?;
            println!(
                "Solved {} vertices ({} fixed)",
                report.free_vertices, report.locked_vertices
            );
            Ok(())
        }),
        Commands::Remesh {
            input,
            output,
            target_length,
            adaptive_error,
            iterations,
            feature_angle,
            sequential,
        } => transform(&input, &output, "remeshing", |mesh| {
            let mean = mesh.mean_edge_length();
            let target = target_length.unwrap_or(mean);
            let options = match adaptive_error {
                Some(error) => RemeshOptions::adaptive(0.5 * target, 2.0 * target, error),
                None => RemeshOptions::uniform(target),
            }
            .with_iterations(iterations)
            .with_parallel(!sequential)
            .with_progress(create_progress());
            if let Some(angle) = feature_angle {
                let marked = detect_angle(mesh, angle)? + detect_boundary(mesh)?;
                println!("Feature edges: {}", marked);
            }
            println!("Edge length: mean {:.6}, target {:.6}", mean, target);
            let report = remesh(mesh, &options)?;
            println!(
                "{} iterations ({}): {} splits, {} collapses, {} flips",
                report.iterations, report.termination, report.splits, report.collapses, report.flips
            );
            clear_features(mesh);
            Ok(())
        }),
        Commands::Simplify {
            input,
            output,
            vertices,
            ratio,
            aspect_ratio,
            normal_deviation,
            collapse_boundary,
        } => transform(&input, &output, "simplification", |mesh| {
            let target = vertices.unwrap_or((mesh.num_vertices() as f64 * ratio).round() as usize);
            let mut options = SimplifyOptions::with_target_vertices(target)
                .with_preserve_boundary(!collapse_boundary)
                .with_progress(create_progress());
            if let Some(ratio) = aspect_ratio {
                options = options.with_aspect_ratio_min(ratio);
            }
            if let Some(degrees) = normal_deviation {
                options = options.with_normal_deviation(degrees);
            }
            let report = simplify(mesh, &options)?;
            println!(
                "{} collapses, {} -> {} vertices ({})",
                report.collapses, report.vertices_before, report.vertices_after, report.termination
            );
            Ok(())
        }),
        Commands::Subdivide {
            input,
            output,
            method,
            iterations,
            sequential,
        } => transform(&input, &output, "subdivision", |mesh| {
            let options = SubdivideOptions::new(iterations)
                .with_parallel(!sequential)
                .with_progress(create_progress());
            match method {
                SubdivideMethod::Loop => loop_subdivide(mesh, &options)?,
                SubdivideMethod::CatmullClark => catmull_clark_subdivide(mesh, &options)?,
                SubdivideMethod::Sqrt3 => sqrt3_subdivide(mesh, &options)?,
            }
            Ok(())
        }),
        Commands::FillHoles {
            input,
            output,
            max_size,
            no_refine,
        } => transform(&input, &output, "hole filling", |mesh| {
            let options = HoleFillOptions::new(max_size).with_refine(!no_refine);
            let report = fill_holes(mesh, &options)?;
            println!(
                "Holes: {} found, {} filled, {} too large, {} non-manifold, {} failed",
                report.found,
                report.filled,
                report.skipped_too_large,
                report.skipped_non_manifold,
                report.failed
            );
            Ok(())
        }),
        Commands::Stitch {
            input,
            output,
            tolerance,
            merge_components,
        } => transform(&input, &output, "stitching", |mesh| {
            let options = StitchOptions::default()
                .with_tolerance(tolerance)
                .with_merge_components(merge_components);
            let report = stitch(mesh, &options)?;
            println!(
                "Welded {} edges, merged {} vertices, reversed {} pieces; components {} -> {}",
                report.stitched_edges,
                report.merged_vertices,
                report.reversed_components,
                report.components_before,
                report.components_after
            );
            Ok(())
        }),
        Commands::Parameterize {
            input,
            output,
            method,
            square,
        } => transform(&input, &output, "parameterization", |mesh| {
            let method = match method {
                ParamMethod::Harmonic => Method::Harmonic,
                ParamMethod::Lscm => Method::Lscm,
            };
            let boundary = if square {
                BoundaryShape::Square
            } else {
                BoundaryShape::Circle
            };
            let options = ParameterizeOptions::default().with_boundary(boundary);
            let uv = parameterize(mesh, method, &options)?;
            if let Some((lo, hi)) = uv.bounding_box(mesh) {
                println!("UV bounds: ({:.4}, {:.4}) to ({:.4}, {:.4})", lo.x, lo.y, hi.x, hi.y);
            }
            Ok(())
        }),
        Commands::Triangulate {
            input,
            output,
            objective,
        } => transform(&input, &output, "triangulation", |mesh| {
            let objective = match objective {
                TriangulateObjective::MinArea => Objective::MinArea,
                TriangulateObjective::MaxAngle => Objective::MaxAngle,
            };
            let report = triangulate(mesh, &TriangulateOptions::new(objective))?;
            println!(
                "Triangulated {} faces (+{} triangles, {} failed)",
                report.triangulated_faces, report.added_faces, report.failed_faces
            );
            Ok(())
        }),
        Commands::Sample {
            input,
            output,
            count,
            seed,
        } => cmd_sample(&input, &output, count, seed),
        Commands::Polygonize {
            input,
            output,
            angle,
            keep_straight_vertices,
        } => transform(&input, &output, "polygonization", |mesh| {
            let options = PolygonizeOptions::default()
                .with_angle(angle)
                .with_dissolve_straight_vertices(!keep_straight_vertices);
            let report = polygonize(mesh, &options)?;
            println!(
                "{} planar regions: {} merged, {} skipped",
                report.regions, report.merged_regions, report.skipped_regions
            );
            Ok(())
        }),
        Commands::Features { input, angle, boundary } => {
            let mut mesh: HalfEdgeMesh = io::load(&input)?;
            let mut marked = detect_angle(&mut mesh, angle)?;
            if boundary {
                marked += detect_boundary(&mut mesh)?;
            }
            println!("Feature edges: {} of {}", marked, mesh.num_edges());
            Ok(())
        }
        Commands::Geodesic {
            input,
            seeds,
            max_distance,
            max_vertices,
        } => cmd_geodesic(&input, &seeds, max_distance, max_vertices),
    }
}

fn weighting(uniform: bool) -> LaplaceWeighting {
    if uniform {
        LaplaceWeighting::Uniform
    } else {
        LaplaceWeighting::Cotangent
    }
}

/// Load `input`, run `step` on it, report the change and save to `output`.
fn transform<F>(input: &Path, output: &Path, name: &str, step: F) -> CliResult
where
    F: FnOnce(&mut HalfEdgeMesh) -> CliResult,
{
    let mut mesh: HalfEdgeMesh = io::load(input)?;
    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());

    let start = Instant::now();
    step(&mut mesh)?;
    let elapsed = start.elapsed();

    mesh.compact();
    println!(
        "Result: {} vertices, {} faces ({} in {:.2?})",
        mesh.num_vertices(),
        mesh.num_faces(),
        name,
        elapsed
    );
    io::save(&mesh, output)?;
    println!("Saved: {}", output.display());
    Ok(())
}

/// Progress bar on stderr; only ever moves forward.
fn create_progress() -> Progress {
    let shown = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let percent = if current >= total {
            100
        } else {
            (current * 100 + total / 2) / total
        };
        if shown.fetch_max(percent, Ordering::Relaxed) >= percent && percent != 100 {
            return;
        }

        let width = 30;
        let filled = percent * width / 100;
        eprint!("\r[{}{}] {:3}% {}", "=".repeat(filled), " ".repeat(width - filled), percent, message);
        let _ = std::io::stderr().flush();
        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &Path) -> CliResult {
    let mesh: HalfEdgeMesh = io::load(input)?;
    let info = topology_info(&mesh);

    println!("File: {}", input.display());
    println!("Vertices: {}", info.vertices);
    println!("Edges: {}", info.edges);
    println!("Faces: {}", info.faces);
    println!("Euler characteristic: {}", info.euler_characteristic);
    println!("Components: {}", info.components);
    println!("Border loops: {}", info.borders);
    println!("Genus (closed components): {}", info.genus);
    if info.non_manifold_vertices > 0 {
        println!("Non-manifold vertices: {}", info.non_manifold_vertices);
    }

    let kind = if mesh.is_triangle_mesh() {
        "triangles"
    } else if mesh.is_quad_mesh() {
        "quads"
    } else {
        "mixed polygons"
    };
    println!("Faces are: {}", kind);
    println!("Surface area: {:.6}", mesh.surface_area());
    println!("Mean edge length: {:.6}", mesh.mean_edge_length());
    if let Some((lo, hi)) = mesh.bounding_box() {
        let size = hi - lo;
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3}), size {:.3} x {:.3} x {:.3}",
            lo.x, lo.y, lo.z, hi.x, hi.y, hi.z, size.x, size.y, size.z
        );
    }
    Ok(())
}

fn cmd_components(input: &Path) -> CliResult {
    let mut mesh: HalfEdgeMesh = io::load(input)?;
    let count = label_components(&mut mesh)?;
    println!("{} components", count);
    for (i, component) in extract_components(&mesh).iter().enumerate() {
        println!(
            "  #{}: {} faces, {} vertices, χ = {}, {} borders, area {:.6}, {}",
            i,
            component.num_faces(),
            component.num_vertices(),
            component.euler_characteristic(),
            component.num_borders(),
            component.surface_area(),
            component.classify()
        );
    }
    Ok(())
}

fn stats(values: impl Iterator<Item = f64>) -> (f64, f64, f64) {
    let (mut lo, mut hi, mut sum, mut n) = (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize);
    for x in values {
        lo = lo.min(x);
        hi = hi.max(x);
        sum += x;
        n += 1;
    }
    (lo, hi, if n > 0 { sum / n as f64 } else { 0.0 })
}

fn cmd_curvature(input: &Path, smoothing_steps: usize, one_ring: bool) -> CliResult {
    let mut mesh: HalfEdgeMesh = io::load(input)?;
    let options = CurvatureOptions::default()
        .with_post_smoothing_steps(smoothing_steps)
        .with_two_ring(!one_ring);
    let curvature = compute_curvature(&mut mesh, &options)?;
    let vertices: Vec<VertexId> = mesh.vertex_ids().collect();

    let rows: [(&str, fn(&CurvatureResult, VertexId) -> f64); 4] = [
        ("min", CurvatureResult::min),
        ("max", CurvatureResult::max),
        ("mean", CurvatureResult::mean),
        ("gauss", CurvatureResult::gaussian),
    ];
    for (name, value) in rows {
        let (lo, hi, avg) = stats(vertices.iter().map(|&v| value(&curvature, v)));
        println!("{:>6}: min {:.4}, max {:.4}, avg {:.4}", name, lo, hi, avg);
    }
    Ok(())
}

fn cmd_sample(input: &Path, output: &Path, count: usize, seed: Option<u64>) -> CliResult {
    let mesh: HalfEdgeMesh = io::load(input)?;
    let mut options = SampleOptions::new(count);
    if let Some(seed) = seed {
        options = options.with_seed(seed);
    }
    let cloud = sample(&mesh, &options)?;

    let mut points: HalfEdgeMesh = HalfEdgeMesh::with_capacity(cloud.len(), 0);
    for &p in &cloud.points {
        points.add_vertex(p);
    }
    io::save(&points, output)?;
    println!("Saved {} points to {}", cloud.len(), output.display());
    Ok(())
}

fn cmd_geodesic(input: &Path, seeds: &[usize], max_distance: Option<f64>, max_vertices: Option<usize>) -> CliResult {
    let mut mesh: HalfEdgeMesh = io::load(input)?;
    let mut options = GeodesicOptions::default();
    if let Some(d) = max_distance {
        options = options.with_max_distance(d);
    }
    if let Some(n) = max_vertices {
        options = options.with_max_vertices(n);
    }
    let seeds: Vec<VertexId> = seeds.iter().map(|&s| VertexId::new(s)).collect();
    let result = compute_geodesics(&mut mesh, &seeds, &options)?;

    println!(
        "Reached {} of {} vertices ({})",
        result.reachable_count(),
        mesh.num_vertices(),
        result.termination()
    );
    if let Some((v, d)) = result.farthest_vertex() {
        println!("Farthest vertex: {} at distance {:.6}", v.index(), d);
    }
    Ok(())
}
