use std::process::ExitCode;

use clap::Parser;

use skein_node::cli;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(async {
        match cli::run(cli).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Fatal error: {}", e);
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}
