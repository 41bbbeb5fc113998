use imagepipe_core::Config;

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (telemetry, storage, queues, workers, routes)
    let (pipeline, router) = imagepipe_api::setup::initialize_app(config.clone()).await?;

    // Serve until shutdown, then drain the workers
    imagepipe_api::setup::server::start_server(&config, router, pipeline).await?;

    Ok(())
}
