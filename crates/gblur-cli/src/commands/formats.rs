//! Formats command
//!
//! Lists the pixel format registry.

use anyhow::Result;
use gblur_core::{EdgeMode, KernelKey, KernelVariant, PixelFormat};
use tracing::trace;

pub fn run(verbose: u8) -> Result<()> {
    trace!("formats::run");

    println!(
        "{:<12} {:>6} {:>9} {:>7} {:>8}",
        "FORMAT", "BYTES", "CHANNELS", "DOMAIN", "ELEMENT"
    );
    for format in PixelFormat::all() {
        println!(
            "{:<12} {:>6} {:>9} {:>7} {:>8}",
            format.id,
            format.bytes_per_texel,
            format.channel_count,
            format.domain.to_string(),
            format!("{:?}", format.element),
        );
    }

    if verbose > 1 {
        for format in PixelFormat::all() {
            for variant in [KernelVariant::Direct, KernelVariant::Separable] {
                let key = KernelKey::new(format, variant, EdgeMode::default());
                println!("\n// {}\n{}", key.label(), gblur_core::generate(&key)?);
            }
        }
    }

    Ok(())
}
