use clap::Parser;
use mlops_model::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => cli::train::run_local(args).await,
        Command::TrainTracked(args) => cli::train::run_tracked(args).await,
        Command::Predict(args) => cli::predict::run(args).await,
        Command::Info(args) => cli::predict::info(args).await,
        Command::SampleData(args) => cli::sample_data::run(args).await,
    }
}
