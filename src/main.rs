//! Recast CLI: codemod orchestration.

use clap::Parser;
use recast::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    recast::logging::init(cli.verbose);
    if let Err(e) = recast::cli::dispatch(cli.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
