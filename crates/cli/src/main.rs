#![deny(unsafe_code)]
//! CLI binary for DFLIC flow animations.
//!
//! Subcommands:
//! - `render <scene>`: animate a scene for N frames, one PNG per frame
//! - `list`: print available scenes
//!
//! Logging goes through `env_logger`; set `RUST_LOG=info` to follow the
//! FLIC phases frame by frame.

mod error;

use clap::{Parser, Subcommand};
use dflic_scenes::Scene;
use error::CliError;
use log::info;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "dflic", about = "Dynamic line integral convolution renderer")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Animate a scene and write one grayscale PNG per frame.
    Render {
        /// Scene name (e.g. "vortex").
        scene: String,

        /// Image width in pixels.
        #[arg(short = 'W', long, default_value_t = 256)]
        width: usize,

        /// Image height in pixels.
        #[arg(short = 'H', long, default_value_t = 256)]
        height: usize,

        /// Number of frames to render.
        #[arg(short, long, default_value_t = 8)]
        frames: usize,

        /// Scene time between frames.
        #[arg(long, default_value_t = 0.1)]
        dt: f64,

        /// PRNG seed for deterministic output.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Scene and engine parameters as a JSON string.
        #[arg(long, default_value = "{}")]
        params: String,

        /// Directory receiving frame_0000.png, frame_0001.png, ...
        #[arg(short, long, default_value = "frames")]
        output_dir: PathBuf,
    },
    /// List available scenes.
    List,
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::List => {
            let scenes = Scene::list_scenes();
            if cli.json {
                let info = serde_json::json!({ "scenes": scenes });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Scenes:");
                for name in scenes {
                    println!("  {name}");
                }
            }
        }
        Command::Render {
            scene,
            width,
            height,
            frames,
            dt,
            seed,
            params,
            output_dir,
        } => {
            let params: serde_json::Value = serde_json::from_str(&params)
                .map_err(|e| CliError::Input(format!("invalid --params JSON: {e}")))?;
            if frames == 0 {
                return Err(CliError::Input("--frames must be at least 1".into()));
            }
            if !dt.is_finite() || dt < 0.0 {
                return Err(CliError::Input(format!("--dt must be non-negative, got {dt}")));
            }

            let mut sc = Scene::from_name(&scene, width, height, seed, &params)?;
            fs::create_dir_all(&output_dir)?;

            let mut stats = Vec::with_capacity(frames);
            let mut paths = Vec::with_capacity(frames);
            for i in 0..frames {
                let frame = sc.render_frame()?;
                let path = output_dir.join(format!("frame_{i:04}.png"));
                dflic_scenes::snapshot::write_png(sc.output(), &path)?;
                info!("wrote {}", path.display());
                sc.advance(dt)?;
                stats.push(frame);
                paths.push(path.display().to_string());
            }

            if cli.json {
                let info = serde_json::json!({
                    "scene": scene,
                    "width": width,
                    "height": height,
                    "frames": frames,
                    "dt": dt,
                    "seed": seed,
                    "params": sc.params(),
                    "outputs": paths,
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                let particles = stats.last().map_or(0, |s| s.particles);
                eprintln!(
                    "rendered {scene} ({width}x{height}, {frames} frames, dt {dt}, seed {seed}, {particles} particles) -> {}",
                    output_dir.display()
                );
            }
        }
    }

    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
