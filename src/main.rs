use anyhow::Result;
use clap::Parser;

use hexfuse::cli::{Cli, Commands};
use hexfuse::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Matrix(args) => commands::matrix(&cli, args),
        Commands::Population(args) => commands::population(&cli, args),
        Commands::Internet => commands::internet(&cli),
        Commands::Health => commands::health(&cli),
        Commands::Fuse => commands::fuse(&cli),
        Commands::Pipeline(args) => commands::pipeline(&cli, args),
    }
}
