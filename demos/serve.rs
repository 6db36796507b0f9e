//! Control-plane server demo
//!
//! Runs the engine against the public MangaDex API with the HTTP control
//! plane on 127.0.0.1:50051. Pass a JSON config file path as the first
//! argument to override the defaults; set `RUST_LOG` to adjust logging.
//!
//! After starting, you can:
//! - Search via GET http://127.0.0.1:50051/search?q=one%20piece&max_results=5
//! - Open a manga page via GET http://127.0.0.1:50051/manga/<manga id>
//! - Request an archive via GET http://127.0.0.1:50051/to_cbz?... and poll it

use mangadex_cbz::{CbzEngine, Config, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let address = config.api.bind_address;

    let engine = Arc::new(CbzEngine::new(config)?);

    println!("Starting mangadex-cbz control plane on http://{}", address);
    println!();
    println!("Example commands:");
    println!("  # Search");
    println!("  curl 'http://{}/search?q=one%20piece&max_results=5'", address);
    println!();
    println!("  # Build volume 1 (chapters 1 and 2), then poll until completed");
    println!(
        "  curl 'http://{}/to_cbz?manga_id=<id>&language=en&volume_name=1&chapter_names=%5B%221%22,%222%22%5D&prefix=Series&part=0'",
        address
    );
    println!("  curl 'http://{}/task/<task_id>/status'", address);
    println!();
    println!("  # Download the archive");
    println!("  curl -OJ 'http://{}/download/<task_id>'", address);
    println!();
    println!("Press Ctrl+C to stop");

    run_with_shutdown(engine).await?;
    Ok(())
}
