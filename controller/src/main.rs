mod gateway;
mod host;
mod prober;

use std::path::PathBuf;

use clap::Parser;

/// Switches a light on and off depending on nearby Bluetooth devices.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    host::run(&cli.config).await
}
