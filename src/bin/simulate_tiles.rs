//! Headless tile simulation: walks a viewer across the terrain and drives the
//! session frame by frame.
//!
//! Usage: cargo run --release --bin simulate_tiles -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Load settings from a JSON file (default: built-in)
//!   --seed <SEED>     Noise seed (default: 12345)
//!   --steps <N>       Tiles to walk along +x (default: 4)
//!   --frames <N>      Frames per tile walked (default: 120)
//!   --jobs <N>        Worker threads (default: from settings)
//!   --save <DIR>      Write tile snapshots to DIR when done

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use glam::Vec2;

use terratile::core::Result;
use terratile::terrain::persist::save_snapshot;
use terratile::terrain::{
    LodSwitchEvent, NoiseGraph, NoiseParams, TerrainSession, TerrainSettings, TileEvent,
};

const FRAME: Duration = Duration::from_millis(16);

fn main() {
    terratile::core::logging::init();

    if let Err(e) = run() {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut settings = match parse_str_arg(&args, "--config") {
        Some(path) => TerrainSettings::load_sync(&PathBuf::from(path))?,
        None => TerrainSettings::default(),
    };
    if let Some(jobs) = parse_usize_arg(&args, "--jobs") {
        settings.worker_threads = jobs;
    }
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let walk = parse_usize_arg(&args, "--steps").unwrap_or(4);
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(120);
    let save_dir = parse_str_arg(&args, "--save").map(PathBuf::from);

    println!("=== Terratile Simulation ===");
    println!("Tile:   {}m, main {}px, draft {}px", settings.tile_size, settings.main_resolution, settings.draft_resolution);
    println!("Range:  generate {}, retain {}", settings.generate_range, settings.retain_range);
    println!("Seed:   {}", seed);
    println!("Walk:   {} tiles x {} frames", walk, frames);
    println!();

    let graph = Arc::new(NoiseGraph::new(NoiseParams { seed, ..NoiseParams::default() }));
    let mut session = TerrainSession::threaded(settings.clone(), graph)?;

    let applied = Arc::new(AtomicUsize::new(0));
    let switches = Arc::new(AtomicUsize::new(0));
    {
        let applied = Arc::clone(&applied);
        session.events().tile_applied.subscribe(Arc::new(move |_: &TileEvent<'_>| {
            applied.fetch_add(1, Ordering::Relaxed);
        }));
        let switches = Arc::clone(&switches);
        session.events().lod_switched.subscribe(Arc::new(move |e: &LodSwitchEvent| {
            log::trace!("{} {:?} -> {:?}", e.coord, e.previous, e.current);
            switches.fetch_add(1, Ordering::Relaxed);
        }));
    }

    let start = Instant::now();
    let speed = settings.tile_size / frames.max(1) as f32;
    let mut position = Vec2::splat(settings.tile_size * 0.5);

    for frame in 0..walk * frames {
        let deployed = session.deploy_at(position);
        if deployed.placed + deployed.moved + deployed.removed > 0 {
            log::info!(
                "Frame {}: viewer at ({:.0}, {:.0}), {:?}",
                frame, position.x, position.y, deployed
            );
        }
        session.update();
        position.x += speed;
        std::thread::sleep(FRAME);
    }

    // let the last deploy finish
    while session.is_working() {
        session.update();
        std::thread::sleep(FRAME);
    }

    let stats = session.stats();
    println!();
    println!("Done in {:.1}s", start.elapsed().as_secs_f32());
    println!("Tiles:     {}", session.tiles().len());
    println!("Passes:    {} submitted, {} completed, {} abandoned, {} restarted",
        stats.passes_submitted, stats.passes_completed, stats.passes_abandoned, stats.passes_restarted);
    println!("Applied:   {}", applied.load(Ordering::Relaxed));
    println!("Switches:  {}", switches.load(Ordering::Relaxed));
    println!("Fixups:    {} applied, {} stale", stats.fixups_applied, stats.fixups_stale);

    if let Some(dir) = save_dir {
        let snapshots = session.snapshots();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(async {
            tokio::fs::create_dir_all(&dir).await?;
            for snapshot in &snapshots {
                save_snapshot(&dir, snapshot).await?;
            }
            Ok::<_, terratile::core::Error>(())
        })?;
        println!("Saved:     {} snapshots to {}", snapshots.len(), dir.display());
    }

    Ok(())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
