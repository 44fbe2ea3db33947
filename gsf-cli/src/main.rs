//! GSF CLI - Command line tool for global solar power forecasts.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "gsf-cli",
    version,
    about = "Global solar forecast toolkit"
)]
struct Cli {
    #[command(flatten)]
    options: gsf_cmd::Options,

    #[command(subcommand)]
    command: gsf_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("Data directory: {}", cli.options.data_dir.display());
    gsf_cmd::run(cli.options, cli.command).await
}
