//! Sweep command
//!
//! Simulates a radius slider: one thread per requested radius, each calling
//! into a shared [`RequestCoalescer`]. At most one blur runs at a time and
//! intermediate radii that arrive while it runs are skipped. The image from
//! the last execution is written out.

use crate::SweepArgs;
use anyhow::{bail, Context, Result};
use gblur_core::reference::blur_separable;
use gblur_core::{EdgeMode, HostImage, RequestCoalescer};
use gblur_gpu::{GpuContext, GpuError, SeparableBlur, Surface};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Blur backend shared by all requesters.
enum Backend {
    Cpu(HostImage),
    Gpu {
        ctx: GpuContext,
        input: Surface,
        pipeline: Mutex<SeparableBlur>,
    },
}

impl Backend {
    fn blur(&self, radius: u32) -> Result<HostImage, GpuError> {
        match self {
            Backend::Cpu(image) => Ok(blur_separable(image, radius, EdgeMode::Zero)),
            Backend::Gpu { ctx, input, pipeline } => {
                let mut pipeline = pipeline.lock().unwrap_or_else(|p| p.into_inner());
                let output = pipeline.blur(input, radius, None)?;
                let image = output.to_host(ctx)?;
                output.destroy();
                Ok(image)
            }
        }
    }

    fn reallocations(&self) -> Option<u64> {
        match self {
            Backend::Cpu(_) => None,
            Backend::Gpu { pipeline, .. } => {
                Some(pipeline.lock().unwrap_or_else(|p| p.into_inner()).reallocations())
            }
        }
    }
}

pub fn run(args: SweepArgs, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), radii = ?args.radii, "sweep::run");

    if args.radii.is_empty() {
        bail!("--radii must name at least one radius");
    }

    let image = super::load_png(&args.input)?;
    let backend = if args.cpu {
        Backend::Cpu(image)
    } else {
        let ctx = super::open_gpu()?;
        let input = Surface::from_host(&ctx, &image, Surface::DEFAULT_USAGE)?;
        let pipeline = SeparableBlur::create(&ctx, image.format().id)?;
        Backend::Gpu {
            ctx,
            input,
            pipeline: Mutex::new(pipeline),
        }
    };
    let backend = Arc::new(backend);

    let latest: Arc<Mutex<Option<(u32, HostImage)>>> = Arc::new(Mutex::new(None));
    let coalescer = {
        let backend = backend.clone();
        let latest = latest.clone();
        Arc::new(
            RequestCoalescer::new(move |radius: u32| {
                let backend = backend.clone();
                async move { backend.blur(radius).map(|image| (radius, image)) }
            })
            .on_result(move |(radius, image): (u32, HostImage)| {
                debug!(radius, "sweep step rendered");
                *latest.lock().unwrap_or_else(|p| p.into_inner()) = Some((radius, image));
            })
            .on_error(|e: &GpuError| warn!(error = %e, "sweep step failed")),
        )
    };

    let stagger = Duration::from_millis(args.stagger_ms);
    let handles: Vec<_> = args
        .radii
        .iter()
        .enumerate()
        .map(|(i, &radius)| {
            let coalescer = coalescer.clone();
            thread::spawn(move || {
                thread::sleep(stagger * i as u32);
                pollster::block_on(coalescer.request(radius))
            })
        })
        .collect();

    let mut failures = 0usize;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "drain reported failure");
                failures += 1;
            }
            Err(_) => bail!("sweep thread panicked"),
        }
    }

    let executions = coalescer.executions();
    info!(requests = args.radii.len(), executions, failures, "sweep finished");

    let (radius, image) = latest
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
        .context("No sweep step completed")?;
    super::save_png(&args.output, &image)?;

    println!(
        "requests: {}  executions: {}  skipped: {}  final radius: {}",
        args.radii.len(),
        executions,
        (args.radii.len() as u64).saturating_sub(executions),
        radius
    );
    if verbose > 0 {
        if let Some(n) = backend.reallocations() {
            println!("working surface allocations: {}", n);
        }
        println!("Wrote {}", args.output.display());
    }

    if failures > 0 {
        bail!("{} drain(s) reported failures", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gblur_core::PixelFormat;

    #[test]
    fn test_cpu_backend_blurs() {
        let format = PixelFormat::lookup("rgba8unorm").unwrap();
        let mut image = HostImage::filled(format, 5, 5, 0.0).unwrap();
        image.set(2, 2, 0, 1.0);
        let backend = Backend::Cpu(image);

        let out = backend.blur(1).unwrap();
        assert!(out.get(2, 2, 0) < 1.0);
        assert!(out.get(1, 2, 0) > 0.0);
        assert_eq!(backend.reallocations(), None);
    }
}
