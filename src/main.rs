//! shipbot - cut, sign and publish plugin releases.

use clap::Parser;
use shipbot::cli::{self, Args, OutputManager};
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    match cli::run(args).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            let output = OutputManager::new();
            output.error(&format!("Fatal error: {e}"));
            process::exit(1);
        }
    }
}
