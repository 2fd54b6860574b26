use anyhow::{anyhow, Result};
use clap::Parser;
use iia_native::{
    engine::NativeEngine,
    session::ModelSession,
    util::{cmd::Args, config::BridgeConfig, init_logging},
};
use tracing::info;

fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let config = BridgeConfig::load(args.config.as_deref())?;
    let threads = args.threads();

    info!("Loading model: {}", args.model);
    info!("Configuration:");
    info!("  - Threads: {}", threads);
    info!("  - Weight type: {:?}", config.context.weight_type);
    info!("  - Sampler: {:?}", config.sampling.sample_method);

    let mut session = ModelSession::new(NativeEngine, config);
    session.load(&args.model, &args.vae, threads)?;

    let request = args.request();
    let image = session
        .generate(&request)
        .map_err(|e| anyhow!("Generation failed: {}", e))?;

    image.save(&args.output)?;
    info!(
        "Saved {}x{} image to {:?}",
        image.width, image.height, args.output
    );

    session.release();
    Ok(())
}
