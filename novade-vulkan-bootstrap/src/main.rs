use anyhow::Context;
use novade_vulkan_bootstrap::{bootstrap, logging, BootstrapConfig, HeadlessSurfaceSource};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn load_config() -> anyhow::Result<BootstrapConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => BootstrapConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(BootstrapConfig::default()),
    }
}

fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    logging::init_logging(&config.log_level);
    tracing::info!("NovaDE Vulkan present loop starting up...");

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("Failed to register handler for signal {}", signal))?;
    }

    let stats = bootstrap::run(&config, &HeadlessSurfaceSource, |_| shutdown.load(Ordering::SeqCst))
        .context("Vulkan present loop failed")?;
    tracing::info!("Shut down cleanly after {} frames.", stats.frames);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet if the configuration failed to load.
            logging::init_logging("error");
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
