mod scene;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use worldspace_collide::{ClosestHit, PointSweep, SweepReport, TriangleSweep, sweep};
use worldspace_common::{EntityId, WorldTriangle};
use worldspace_stream::FocusStats;
use worldspace_visibility::{CullStats, ViewParams, VisibilityIndex};

use crate::scene::{CliConfig, demo_chunks, demo_space};

#[derive(Parser)]
#[command(name = "worldspace-cli", about = "CLI tool for worldspace spatial queries")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML settings file with optional `space` and `visibility` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective settings
    Info,
    /// Sweep a ray or triangle through a demo scene
    Sweep {
        /// Start point as x,y,z
        #[arg(
            long,
            value_parser = parse_vec3,
            allow_hyphen_values = true,
            default_value = "-300,40,20"
        )]
        from: Vec3,
        /// End point as x,y,z
        #[arg(
            long,
            value_parser = parse_vec3,
            allow_hyphen_values = true,
            default_value = "300,40,20"
        )]
        to: Vec3,
        /// Sweep a small triangle instead of a ray
        #[arg(long)]
        triangle: bool,
        /// Number of boxes in the demo scene
        #[arg(short, long, default_value = "16")]
        obstacles: usize,
    },
    /// Cull a demo chunk field against a perspective camera
    Cull {
        /// Camera position as x,y,z
        #[arg(
            long,
            value_parser = parse_vec3,
            allow_hyphen_values = true,
            default_value = "0,300,-900"
        )]
        eye: Vec3,
        /// Point the camera looks at as x,y,z
        #[arg(
            long,
            value_parser = parse_vec3,
            allow_hyphen_values = true,
            default_value = "0,0,0"
        )]
        target: Vec3,
        /// Vertical field of view in degrees
        #[arg(long, default_value = "60")]
        fov: f32,
        /// Chunks per side of the demo field
        #[arg(long, default_value = "32")]
        side: u32,
    },
    /// Find the demo chunk containing a point
    Locate {
        /// Point as x,y,z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        point: Vec3,
        /// Chunks per side of the demo field
        #[arg(long, default_value = "32")]
        side: u32,
    },
    /// Print the focus window's per-column obstacle counts
    Grid {
        /// Focus point as x,y,z
        #[arg(
            long,
            value_parser = parse_vec3,
            allow_hyphen_values = true,
            default_value = "0,0,0"
        )]
        focus: Vec3,
        /// Number of boxes in the demo scene
        #[arg(short, long, default_value = "16")]
        obstacles: usize,
    },
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, got {} values", parts.len())),
    }
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    version: &'a str,
    #[serde(flatten)]
    config: &'a CliConfig,
}

#[derive(Serialize)]
struct SweepOutput {
    shape: &'static str,
    from: Vec3,
    to: Vec3,
    distance: Option<f32>,
    owner: Option<EntityId>,
    cells_visited: usize,
    obstacles_tested: usize,
    focus: FocusStats,
}

#[derive(Serialize)]
struct CullOutput {
    eye: Vec3,
    target: Vec3,
    trees: usize,
    chunks: usize,
    visible: usize,
    stats: CullStats,
    /// Centres of the first few chunks, nearest first.
    leading: Vec<Vec3>,
}

#[derive(Serialize)]
struct LocateOutput {
    point: Vec3,
    centre: Option<Vec3>,
    bounds_min: Option<Vec3>,
    bounds_max: Option<Vec3>,
}

fn locate(index: &VisibilityIndex, point: Vec3) -> LocateOutput {
    let chunk = index.find_chunk(point).and_then(|id| index.chunk(id));
    LocateOutput {
        point,
        centre: chunk.map(|c| c.centre()),
        bounds_min: chunk.map(|c| c.bounds().min),
        bounds_max: chunk.map(|c| c.bounds().max),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            let info = InfoOutput {
                version: env!("CARGO_PKG_VERSION"),
                config: &config,
            };
            emit(cli.json, &info, || {
                let space = &config.space;
                let layout = &config.visibility;
                println!("worldspace-cli v{}", info.version);
                let window = 2 * space.focus_span_half + 1;
                println!(
                    "space: cell={} window={window}x{window} tree_depth={} \
                     grid=({}, {})..({}, {}) edge_budget={}",
                    space.cell_size,
                    space.obstacle_tree_depth,
                    space.grid_min.x,
                    space.grid_min.z,
                    space.grid_max.x,
                    space.grid_max.z,
                    space.edge_build_budget
                );
                println!(
                    "visibility: depth={} chunk={} tree_extent={}",
                    layout.depth,
                    layout.chunk_size,
                    layout.extent()
                );
            })?;
        }
        Commands::Sweep {
            from,
            to,
            triangle,
            obstacles,
        } => {
            let mut space = demo_space(&config.space, obstacles)?;
            let focus = space.focus(from);
            let mut closest = ClosestHit::default();
            let generation = space.next_generation();
            let report: SweepReport = if triangle {
                let shape = TriangleSweep::new(WorldTriangle::new(
                    from,
                    from + Vec3::new(20.0, 0.0, 0.0),
                    from + Vec3::new(0.0, 0.0, 20.0),
                ));
                sweep(&space, generation, &shape, to, &mut closest)
            } else {
                sweep(&space, generation, &PointSweep::new(from), to, &mut closest)
            };

            let output = SweepOutput {
                shape: if triangle { "triangle" } else { "ray" },
                from,
                to,
                distance: closest.hit.map(|h| h.distance),
                owner: closest.hit.map(|h| h.owner),
                cells_visited: report.cells_visited,
                obstacles_tested: report.obstacles_tested,
                focus,
            };
            emit(cli.json, &output, || {
                match closest.hit {
                    Some(hit) => println!(
                        "{} hit at {:.3} of {:.3} (owner {})",
                        output.shape,
                        hit.distance,
                        from.distance(to),
                        hit.owner.0
                    ),
                    None => println!("{} missed over {:.3}", output.shape, from.distance(to)),
                }
                println!(
                    "cells visited: {}, obstacles tested: {}, columns built: {}",
                    report.cells_visited, report.obstacles_tested, output.focus.columns_built
                );
            })?;
        }
        Commands::Cull {
            eye,
            target,
            fov,
            side,
        } => {
            let index = demo_chunks(&config.visibility, side)?;
            let view = ViewParams::new(
                Mat4::look_at_rh(eye, target, Vec3::Y),
                Mat4::perspective_rh(fov.to_radians(), 16.0 / 9.0, 1.0, 5000.0),
            );
            let mut visible = Vec::new();
            let stats = index.calculate_visible(&view, index.next_generation(), &mut visible);

            let output = CullOutput {
                eye,
                target,
                trees: index.tree_count(),
                chunks: index.len(),
                visible: visible.len(),
                stats,
                leading: visible
                    .iter()
                    .take(8)
                    .filter_map(|id| index.chunk(*id).map(|c| c.centre()))
                    .collect(),
            };
            emit(cli.json, &output, || {
                println!(
                    "{} of {} chunks visible across {} trees",
                    output.visible, output.chunks, output.trees
                );
                println!(
                    "nodes tested: {}, culled: {}",
                    stats.nodes_tested, stats.nodes_culled
                );
                for centre in &output.leading {
                    println!("  chunk at ({:.0}, {:.0})", centre.x, centre.z);
                }
            })?;
        }
        Commands::Locate { point, side } => {
            let index = demo_chunks(&config.visibility, side)?;
            let output = locate(&index, point);
            emit(cli.json, &output, || match output.centre {
                Some(centre) => println!(
                    "({:.1}, {:.1}, {:.1}) is in the chunk at ({:.0}, {:.0})",
                    point.x, point.y, point.z, centre.x, centre.z
                ),
                None => println!(
                    "({:.1}, {:.1}, {:.1}) is outside every chunk",
                    point.x, point.y, point.z
                ),
            })?;
        }
        Commands::Grid { focus, obstacles } => {
            let mut space = demo_space(&config.space, obstacles)?;
            let stats = space.focus(focus);
            tracing::debug!(?stats, "focused");
            let summary = space.summary();
            emit(cli.json, &summary, || print!("{summary}"))?;
        }
    }

    Ok(())
}
