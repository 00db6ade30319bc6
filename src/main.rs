use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jarvis_ocr_service::config::Config;
use jarvis_ocr_service::{build_pipeline, callback, drivers, health, worker};

#[derive(Parser)]
#[command(name = "jarvis-ocr", about = "Tiered OCR pipeline with asynchronous LLM validation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker loop and callback HTTP server (default).
    Serve,
    /// Probe driver availability on this host and print the active tier list.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Probe => {
            let all_drivers = drivers::build_all(&config);
            let report = health::probe(&config, all_drivers).await?;
            report.print();
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting jarvis-ocr-service");

    let pipeline = build_pipeline(&config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker_loop = worker::Worker::new(
        pipeline.clone(),
        pipeline.input_queue.clone(),
        config.worker_concurrency,
    );
    let worker_handle = {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { worker_loop.run(rx).await })
    };

    let sweep_handle = worker::Worker::spawn_sweep(
        pipeline.clone(),
        std::time::Duration::from_secs(30),
        shutdown_rx.clone(),
    );

    let callback_state = callback::CallbackState { pipeline: pipeline.clone() };
    let app = callback::router(callback_state);
    let listener = tokio::net::TcpListener::bind(&config.callback_bind_addr).await?;
    info!(addr = %config.callback_bind_addr, "callback endpoint listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    let _ = worker_handle.await;
    sweep_handle.abort();

    info!("jarvis-ocr-service stopped");
    Ok(())
}
