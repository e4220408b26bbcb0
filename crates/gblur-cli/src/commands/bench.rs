//! Bench command
//!
//! Times direct against separable on a synthetic image for a list of radii.
//! GPU runs use device timestamps when the adapter supports them and fall
//! back to wall clock around a blocking submit otherwise.

use crate::BenchArgs;
use anyhow::{bail, Result};
use gblur_core::reference::{blur_direct, blur_separable};
use gblur_core::{EdgeMode, HostImage, PixelFormat};
use gblur_gpu::{DeviceTimer, DirectBlur, GpuContext, SeparableBlur, Surface};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Deterministic test pattern with every sample in the format's range.
fn pattern(format: &'static PixelFormat, size: u32) -> Result<HostImage> {
    let max = format.element.max_sample().min(255.0) as f32;
    let ch = format.channel_count;
    let mut image = HostImage::filled(format, size, size, 0.0)?;
    for y in 0..size {
        for x in 0..size {
            for c in 0..ch {
                let v = ((x * 7 + y * 13 + c * 31) % 256) as f32 / 255.0;
                let sample = if format.domain.is_integer() { (v * max).round() } else { v };
                image.set(x, y, c, sample);
            }
        }
    }
    Ok(image)
}

fn mean_ms(total_ns: u128, iterations: u32) -> f64 {
    total_ns as f64 / iterations as f64 / 1_000_000.0
}

pub fn run(args: BenchArgs, verbose: u8) -> Result<()> {
    trace!(size = args.size, radii = ?args.radii, format = %args.format, "bench::run");

    if args.iterations == 0 {
        bail!("--iterations must be at least 1");
    }
    let format = PixelFormat::lookup(&args.format)?;
    let image = pattern(format, args.size)?;

    let rows = if args.cpu {
        bench_cpu(&image, &args)
    } else {
        let ctx = super::open_gpu()?;
        if verbose > 0 {
            println!(
                "{} ({:?}), timestamps: {}",
                ctx.device_name(),
                ctx.backend(),
                ctx.supports_timestamps()
            );
        }
        bench_gpu(&ctx, &image, &args)?
    };

    println!(
        "{}x{} {} ({} iteration(s), {})",
        args.size,
        args.size,
        format.id,
        args.iterations,
        if args.cpu { "cpu" } else { "gpu" }
    );
    println!("{:>6} {:>12} {:>12} {:>8}", "RADIUS", "DIRECT ms", "SEPARABLE ms", "RATIO");
    for (radius, direct, separable) in rows {
        let ratio = if separable > 0.0 { direct / separable } else { 0.0 };
        println!("{:>6} {:>12.3} {:>12.3} {:>7.2}x", radius, direct, separable, ratio);
    }

    Ok(())
}

fn bench_cpu(image: &HostImage, args: &BenchArgs) -> Vec<(u32, f64, f64)> {
    args.radii
        .iter()
        .map(|&radius| {
            let mut direct = 0u128;
            let mut separable = 0u128;
            for _ in 0..args.iterations {
                let start = Instant::now();
                let _ = blur_direct(image, radius, EdgeMode::Zero);
                direct += start.elapsed().as_nanos();

                let start = Instant::now();
                let _ = blur_separable(image, radius, EdgeMode::Zero);
                separable += start.elapsed().as_nanos();
            }
            debug!(radius, direct, separable, "cpu bench row");
            (radius, mean_ms(direct, args.iterations), mean_ms(separable, args.iterations))
        })
        .collect()
}

/// Duration since `start` of the last submission, in nanoseconds. Reads the
/// device timer when present, otherwise waits for the queue to drain.
fn elapsed(ctx: &GpuContext, start: Instant, timer: Option<&mut DeviceTimer>) -> Result<u128> {
    match timer {
        Some(timer) => Ok(timer.read()? as u128),
        None => {
            ctx.wait_idle();
            Ok(start.elapsed().as_nanos())
        }
    }
}

fn bench_gpu(ctx: &GpuContext, image: &HostImage, args: &BenchArgs) -> Result<Vec<(u32, f64, f64)>> {
    let timer = |ctx: &GpuContext| {
        if ctx.supports_timestamps() {
            DeviceTimer::create(ctx).ok()
        } else {
            None
        }
    };

    let format = image.format().id;
    let input = Surface::from_host(ctx, image, Surface::DEFAULT_USAGE)?;
    let output = Surface::new(ctx, format, image.width(), image.height(), Surface::DEFAULT_USAGE)?;
    let mut direct = DirectBlur::create_with(ctx, format, EdgeMode::Zero, timer(ctx))?;
    let mut separable = SeparableBlur::create_with(ctx, format, EdgeMode::Zero, timer(ctx))?;
    info!(timed = direct.timer().is_some(), "gpu bench pipelines ready");

    // Warm up pipeline creation and the working surface.
    let start = Instant::now();
    direct.blur(&input, 1, Some(&output))?;
    elapsed(ctx, start, direct.timer_mut())?;
    separable.blur(&input, 1, Some(&output))?;
    elapsed(ctx, start, separable.timer_mut())?;

    let mut rows = Vec::with_capacity(args.radii.len());
    for &radius in &args.radii {
        let mut direct_ns = 0u128;
        let mut separable_ns = 0u128;
        for _ in 0..args.iterations {
            let start = Instant::now();
            direct.blur(&input, radius, Some(&output))?;
            direct_ns += elapsed(ctx, start, direct.timer_mut())?;

            let start = Instant::now();
            separable.blur(&input, radius, Some(&output))?;
            separable_ns += elapsed(ctx, start, separable.timer_mut())?;
        }
        debug!(radius, direct_ns, separable_ns, "gpu bench row");
        rows.push((
            radius,
            mean_ms(direct_ns, args.iterations),
            mean_ms(separable_ns, args.iterations),
        ));
    }

    for mut timer in [direct.take_timer(), separable.take_timer()].into_iter().flatten() {
        timer.destroy();
    }
    direct.destroy();
    separable.destroy();
    input.destroy();
    output.destroy();
    Ok(rows)
}
