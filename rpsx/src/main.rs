// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

mod config;
mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use rpsx_common::settings::{RendererBackend, Settings};
use rpsx_gpu::backend::null_backend::NullDevice;
use rpsx_gpu::backend::reference::ReferenceDevice;
use rpsx_gpu::backend::GpuDevice;
use rpsx_gpu::{GpuContext, HardwareRenderer};

/// rpsx - PS1 GPU renderer test bench
#[derive(Parser, Debug)]
#[command(name = "rpsx", version, about = "Runs a PS1 GPU test scene through the hardware renderer")]
struct Args {
    /// Path to config file (default: auto-detect rpsx.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Renderer backend (reference, null); overrides the config file
    #[arg(long)]
    backend: Option<String>,

    /// Resolution scale, 0 for automatic; overrides the config file
    #[arg(long)]
    scale: Option<u32>,

    /// Number of frames to render
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Write native VRAM contents after the last frame
    #[arg(long)]
    dump_vram: Option<PathBuf>,

    /// Write the last displayed frame as a BMP
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("rpsx - PS1 GPU renderer");
    info!("=======================");

    let mut settings = config::load_config(args.config.as_deref());
    if let Some(backend) = &args.backend {
        settings.renderer_backend = RendererBackend::from_str_or_default(backend);
    }
    if let Some(scale) = args.scale {
        settings.resolution_scale = scale;
    }
    info!("Renderer backend: {:?}", settings.renderer_backend);

    match settings.renderer_backend {
        RendererBackend::Reference => run(ReferenceDevice::new(), &settings, &args),
        RendererBackend::Null => run(NullDevice::new(), &settings, &args),
    }
}

fn run<D: GpuDevice>(device: D, settings: &Settings, args: &Args) -> Result<()> {
    info!("Using device: {}", device.name());
    let mut renderer = HardwareRenderer::new(device, settings).context("Failed to create renderer")?;
    let context = GpuContext::new();

    for frame in 0..args.frames {
        context.submit(demo::frame_commands(frame));
        let executed = context
            .flush(&mut renderer)
            .with_context(|| format!("Frame {} failed", frame))?;
        let stats = renderer.take_stats();
        info!(
            "Frame {}: {} commands, {} batches, {} read texture updates, {} uniform updates, {} depth rebuilds",
            frame,
            executed,
            stats.num_batches,
            stats.num_vram_read_texture_updates,
            stats.num_uniform_buffer_updates,
            stats.num_depth_buffer_rebuilds
        );
    }

    if let Some(path) = &args.dump_vram {
        let snapshot = renderer.vram_snapshot().context("Failed to read back VRAM")?;
        let mut file =
            BufWriter::new(File::create(path).with_context(|| format!("Failed to create {}", path.display()))?);
        snapshot.write_to(&mut file).context("Failed to write VRAM dump")?;
        info!("Wrote VRAM to {}", path.display());
    }

    if let Some(path) = &args.screenshot {
        match renderer.read_display_pixels() {
            Some((width, height, pixels)) => {
                let mut file = BufWriter::new(
                    File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
                );
                demo::write_bmp(&mut file, width, height, &pixels)?;
                info!("Wrote {}x{} screenshot to {}", width, height, path.display());
            }
            None => log::warn!("Display is blank, no screenshot written"),
        }
    }

    Ok(())
}
