use std::process::ExitCode;

use clap::Parser;
use vigil_service::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    logger::init_tracing();

    let cli = Cli::parse();

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
