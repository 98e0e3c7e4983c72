use anyhow::Context;
use lantern::config::Config;
use lantern::server::Server;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load()?;

    // One extra blocking thread hosts the event loop itself.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(cfg.server.workers.max(1) + 1)
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(serve(cfg))
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let server = Server::bind(&cfg, tokio::runtime::Handle::current())?;
    let shutdown = server.shutdown_handle();
    let mut event_loop = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        res = &mut event_loop => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
            event_loop.await??;
        }
    }

    Ok(())
}
