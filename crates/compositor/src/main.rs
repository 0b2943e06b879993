//! RayOS Compositor CLI
//!
//! Runs the window server headless: scripted sessions for smoke testing and
//! a config dump for writing a starting `compositor.toml`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayos_compositor::hal::FileSettings;
use rayos_compositor::input::{Buttons, InputEvent, Modifiers};
use rayos_compositor::window::WindowLook;
use rayos_compositor::{CompositorConfig, CompositorServerBuilder, Desktop, Point, Rect, WindowSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "rayos-compositor")]
#[command(about = "RayOS Compositor - window server core", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for persisted decorator and Stack & Tile settings
    #[arg(long, value_name = "DIR")]
    settings_dir: Option<PathBuf>,

    /// Screen width override
    #[arg(long)]
    width: Option<i32>,

    /// Screen height override
    #[arg(long)]
    height: Option<i32>,

    /// Decorator skin override
    #[arg(short, long)]
    decorator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless desktop with a few windows and synthetic input
    Run {
        /// Number of windows to open
        #[arg(short = 'n', long, default_value = "4")]
        windows: usize,

        /// Frames to render
        #[arg(short, long, default_value = "60")]
        frames: u32,
    },

    /// Stack two windows, tile a third next to them and print the layout as JSON
    Scenario,

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            CompositorConfig::from_toml(&text)?
        }
        None => CompositorConfig::default(),
    };

    // Override with CLI options
    if let Some(width) = cli.width {
        config.desktop.screen_width = width;
    }
    if let Some(height) = cli.height {
        config.desktop.screen_height = height;
    }
    if let Some(decorator) = &cli.decorator {
        config.desktop.decorator = decorator.clone();
    }

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_toml()?);
        }

        Commands::Run { windows, frames } => {
            let mut builder = CompositorServerBuilder::new().with_config(config);
            if let Some(dir) = &cli.settings_dir {
                builder = builder.with_settings(Arc::new(FileSettings::new(dir)?));
            }
            let mut server = builder.build()?;
            let desktop = Arc::clone(server.desktop());
            if let Err(e) = desktop.restore_settings() {
                log::warn!("Could not restore settings: {}", e);
            }
            let ids = open_cascade(&desktop, windows)?;

            let started = Instant::now();
            for frame in 0..frames {
                let t = started.elapsed().as_micros() as u64;
                let p = Point::new(100 + (frame as i32 * 7) % 600, 100 + (frame as i32 * 5) % 400);
                server.post_event(InputEvent::mouse_moved(p, Buttons::empty(), t));
                if frame % 20 == 0 {
                    server.post_event(InputEvent::mouse_down(p, Buttons::PRIMARY, t));
                    server.post_event(InputEvent::mouse_up(p, Buttons::PRIMARY, t + 1));
                }
                let report = server.render_frame()?;
                log::debug!("Frame {}: {} windows drawn, {} rects", frame, report.rendered.len(), report.presented);
                std::thread::sleep(Duration::from_millis(16));
            }

            if cli.settings_dir.is_some() {
                desktop.save_settings()?;
            }
            server.shutdown();
            let metrics = desktop.metrics();
            println!("windows:  {}", ids.len());
            println!("frames:   {}", metrics.frames);
            println!("presents: {}", metrics.presents);
            println!("rects:    {}", metrics.rects);
            println!("events:   {}", server.dispatched());
        }

        Commands::Scenario => {
            let desktop = CompositorServerBuilder::new().with_config(config).build_desktop();
            let ids = open_cascade(&desktop, 3)?;
            let (a, b, c) = (ids[0], ids[1], ids[2]);

            desktop.stack_windows(b, a, 1)?;
            desktop.tile_window(c, a)?;
            // Drag the group with the management modifiers held down.
            let grab = desktop.frame(a)?.origin().offset_by(20, 20);
            desktop.dispatch(InputEvent::mouse_down(grab, Buttons::PRIMARY, 0).with_modifiers(Modifiers::COMMAND | Modifiers::CONTROL));
            desktop.dispatch(InputEvent::mouse_moved(grab.offset_by(40, 10), Buttons::PRIMARY, 10_000));
            desktop.dispatch(InputEvent::mouse_up(grab.offset_by(40, 10), Buttons::PRIMARY, 20_000));
            desktop.render_frame()?;

            let mut windows = Vec::new();
            for id in ids {
                let frame = desktop.frame(id)?;
                windows.push(serde_json::json!({
                    "id": id.0,
                    "frame": [frame.left, frame.top, frame.width(), frame.height()],
                    "shown": desktop.is_shown(id),
                    "stack": desktop.stack_members(id)?.iter().map(|w| w.0).collect::<Vec<_>>(),
                    "group": desktop.group_of(id).map(|g| g.0),
                }));
            }
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "windows": windows }))?);
        }
    }

    Ok(())
}

fn open_cascade(desktop: &Desktop, count: usize) -> Result<Vec<rayos_compositor::WindowId>> {
    (0..count)
        .map(|i| {
            let offset = 40 * i as i32;
            let look = if i % 2 == 0 { WindowLook::Titled } else { WindowLook::Document };
            let spec = WindowSpec::new(format!("Window {}", i + 1), Rect::new(80 + offset, 80 + offset, 320, 240)).look(look);
            Ok(desktop.create_window(spec)?)
        })
        .collect()
}
