//! OCR gateway
//!
//! ```text
//!     Client upload (multipart)
//!         │
//!         ▼
//!  ┌──────────────────────────────────────────────┐
//!  │  gates: body size → rate limit → headers     │
//!  │         → request id → trusted proxy → auth  │
//!  │         → timeout                            │
//!  └──────────────────────┬───────────────────────┘
//!                         ▼
//!  ┌──────────────────────────────────────────────┐
//!  │  pipeline: validate → store raw → rasterize  │
//!  │     → [preprocess → infer]* → markdown       │
//!  └──────────────────────┬───────────────────────┘
//!                         ▼
//!              inference backend (chat completions)
//! ```

use std::path::PathBuf;

use clap::Parser;

use ocr_gateway::config::load_config;
use ocr_gateway::lifecycle::startup;
use ocr_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "ocr-gateway")]
#[command(about = "HTTP gateway that turns PDFs and images into markdown via a vision model", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "OCR_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ocr-gateway starting");

    startup::run(config).await?;
    Ok(())
}
