//! Blur command
//!
//! Gaussian blur of a PNG with the direct or separable pipeline, or with the
//! CPU reference when `--cpu` is given.

use crate::{BlurArgs, Method};
use anyhow::{Context, Result};
use gblur_core::reference::{blur_direct, blur_separable};
use gblur_core::{EdgeMode, HostImage};
use gblur_gpu::{DeviceTimer, DirectBlur, GpuContext, SeparableBlur, Surface};
use std::time::Instant;
use tracing::{info, trace, warn};

pub fn run(args: BlurArgs, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), radius = args.radius, method = ?args.method, "blur::run");

    let image = super::load_png(&args.input)?;
    let edge = EdgeMode::from(args.edge);

    if verbose > 0 {
        println!(
            "Blurring {} ({}x{}) radius={} method={:?} edge={}{}",
            args.input.display(),
            image.width(),
            image.height(),
            args.radius,
            args.method,
            edge,
            if args.cpu { " [cpu]" } else { "" },
        );
    }

    let blurred = if args.cpu {
        let start = Instant::now();
        let out = match args.method {
            Method::Direct => blur_direct(&image, args.radius, edge),
            Method::Separable => blur_separable(&image, args.radius, edge),
        };
        if args.timing {
            println!("cpu: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
        }
        out
    } else {
        let ctx = super::open_gpu()?;
        gpu_blur(&ctx, &image, &args, edge)?
    };

    super::save_png(&args.output, &blurred)?;
    info!(output = %args.output.display(), "blur written");

    if verbose > 0 {
        println!("Done.");
    }

    Ok(())
}

fn gpu_blur(ctx: &GpuContext, image: &HostImage, args: &BlurArgs, edge: EdgeMode) -> Result<HostImage> {
    let timer = if args.timing {
        match DeviceTimer::create(ctx) {
            Ok(timer) => Some(timer),
            Err(e) => {
                warn!(error = %e, "device timing unavailable");
                None
            }
        }
    } else {
        None
    };

    let input = Surface::from_host(ctx, image, Surface::DEFAULT_USAGE)?;
    let format = image.format().id;

    let (output, timer) = match args.method {
        Method::Direct => {
            let mut pipeline = DirectBlur::create_with(ctx, format, edge, timer)?;
            let output = pipeline.blur(&input, args.radius, None)?;
            let timer = pipeline.take_timer();
            pipeline.destroy();
            (output, timer)
        }
        Method::Separable => {
            let mut pipeline = SeparableBlur::create_with(ctx, format, edge, timer)?;
            let output = pipeline.blur(&input, args.radius, None)?;
            let timer = pipeline.take_timer();
            pipeline.destroy();
            (output, timer)
        }
    };

    let result = output.to_host(ctx).context("Failed to read back blurred surface")?;
    if let Some(mut timer) = timer {
        let ns = timer.read()?;
        println!("device: {}", DeviceTimer::format(ns));
        timer.destroy();
    }

    input.destroy();
    output.destroy();
    Ok(result)
}
