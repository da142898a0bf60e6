use clap::Parser;
use redrive::cli::Args;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    redrive::run().args(Args::parse()).start().await
}
