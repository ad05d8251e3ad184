//! Pipe stdout to the webs
//!
//! ```text
//! shout [-d SECONDS] [--host HOST] -- COMMAND [ARGS...]
//! ```

use std::time::Duration;

use clap::Parser;
use shout_rs::client::config::DEFAULT_HOST;
use shout_rs::client::{ClientConfig, StreamingSession};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shout", about = "Pipe a command's output to the webs")]
struct Cli {
    /// Seconds to wait before running the command
    #[arg(short, long, default_value_t = 10)]
    delay: u64,

    /// Relay host and port
    #[arg(long, env = "SHOUT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Seconds between keep-alive pings
    #[arg(long, default_value_t = 10)]
    ping_interval: u64,

    /// Command to run, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Keep stdout for the command's own output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::new(cli.host)
        .startup_delay(Duration::from_secs(cli.delay))
        .ping_interval(Duration::from_secs(cli.ping_interval.max(1)));

    let session = match StreamingSession::connect(config, Some(cli.command.join(" "))).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error initiating stream: {}", e);
            std::process::exit(1);
        }
    };

    println!("Page: {}", session.viewer_url());

    match session.run(&cli.command).await {
        Ok(summary) => {
            if !summary.exit_status.success() {
                std::process::exit(summary.exit_status.code().unwrap_or(1));
            }
        }
        Err(e) => {
            eprintln!("Error... Websocket was closed unexpectedly: {}", e);
            std::process::exit(1);
        }
    }
}
