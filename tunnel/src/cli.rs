use clap::{Parser, Subcommand};

/// Tunnel - run command sequences in an ephemeral container with persistent shell state
#[derive(Parser, Debug)]
#[command(name = "tunnel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the `run` RPC
    Serve {
        /// JSON-RPC 2.0 over stdio, one request per line. Stdio is the only
        /// transport; the flag is accepted for explicit invocations.
        #[arg(long)]
        stdio: bool,
    },

    /// Execute a single request and print the response JSON
    Run {
        /// Path to a request JSON file. Use "-" to read from stdin
        #[arg(value_name = "REQUEST_FILE")]
        request_file: String,

        /// Runner image (default: from TUNNEL_IMAGE or the stock image)
        #[arg(long, env = "TUNNEL_IMAGE")]
        image: Option<String>,

        /// Container exit deadline in seconds, 0 for unbounded
        #[arg(long)]
        timeout: Option<u64>,
    },
}
