use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use ycc_host::{run_transfer, Args, ImageStore, PpmStore, RgbImage};
use ycc_proc::LocalProcessor;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = args.transfer_config();
    let store = PpmStore;
    let image = store.load_image(&args.input)?;
    ensure!(
        image.is_consistent(),
        "{}: raster does not match {}x{}",
        args.input.display(),
        image.width,
        image.height
    );
    log::info!(
        "{}: {}x{}, {} bytes",
        args.input.display(),
        image.width,
        image.height,
        image.data.len()
    );

    let mut output = vec![0u8; image.data.len()];
    let processor = LocalProcessor::new(config.processor_id);
    let stats = run_transfer(processor, &config, &image.data, &mut output)
        .with_context(|| format!("transfer of {} failed", args.input.display()))?;

    store.store_image(
        &args.output,
        &RgbImage {
            width: image.width,
            height: image.height,
            data: output,
        },
    )?;

    log::info!(
        "{}: {} chunk(s), {} bytes ({} worker, {} edges)",
        args.output.display(),
        stats.chunks,
        stats.bytes,
        config.worker,
        config.edge_policy
    );
    Ok(())
}
