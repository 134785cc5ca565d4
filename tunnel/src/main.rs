mod cli;
mod stdio_rpc;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;

use cli::{Cli, Commands};
use tunnel_core::config::RunnerConfig;
use tunnel_core::observability;
use tunnel_core::protocol::RunRequest;
use tunnel_runner::docker::DockerCli;
use tunnel_runner::Runner;

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { .. } => stdio_rpc::serve_stdio()?,
        Commands::Run {
            request_file,
            image,
            timeout,
        } => {
            let raw = if request_file == "-" {
                let mut s = String::new();
                std::io::stdin().read_to_string(&mut s)?;
                s
            } else {
                std::fs::read_to_string(&request_file)
                    .with_context(|| format!("Failed to read {}", request_file))?
            };
            let request: RunRequest =
                serde_json::from_str(&raw).context("Invalid request JSON")?;

            let mut config = RunnerConfig::from_env();
            if let Some(image) = image {
                config.image = image;
            }
            if let Some(timeout) = timeout {
                config.wait_timeout_secs = if timeout == 0 { None } else { Some(timeout) };
            }

            let runner = Runner::new(DockerCli::new(), config);
            let response = runner.run(&request)?;
            println!("{}", serde_json::to_string(&response)?);
        }
    }

    Ok(())
}
