use cli::{Args, Command};
use commands::{Commands, Settings};
use config::Config;
use outputs::DeployedQueue;
use progress::LogProgress;
use sqs::client::AwsTransport;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod outputs;
pub mod poll;
pub mod progress;
pub mod purge;
pub mod retry;
pub mod sqs;

/// Returns a builder for one invocation of the command line tool.
#[bon::builder(finish_fn = start)]
pub async fn run(args: Args) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("REDRIVE_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("REDRIVE_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let mut config = Config::load()?;
    args.apply(&mut config);

    let transport = AwsTransport::from_env(config.region.clone(), config.endpoint_url.clone()).await;
    let commands = Commands::new(transport, DeployedQueue::from(&config))
        .with_settings(Settings::from(&config))
        .with_progress(LogProgress);

    match args.command {
        Command::Failed => {
            let failed = commands.list_failed().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failed)?);
            } else {
                println!("{failed}");
            }
        }
        Command::FailedPurge => {
            commands.purge_failed().await?;
            println!("The dead letter queue has been purged, failed messages are gone");
        }
        Command::FailedRetry => {
            let report = commands.retry_failed().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }
        Command::Send { body, group_id } => {
            let sent = commands.send(body, group_id).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&sent)?);
            } else {
                println!("Message sent with id {}", sent.message_id);
            }
        }
    }

    Ok(())
}
