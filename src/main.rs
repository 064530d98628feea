use clap::Parser;
use heartecho::cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heartecho=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path, name }) => {
            heartecho::cli::init::run(path, name).await?;
        }
        Some(Commands::Serve { host, port }) => {
            heartecho::cli::serve::run(&cli.config, host, port).await?;
        }
        Some(Commands::Migrate { command }) => {
            heartecho::cli::migrate::run(&cli.config, command).await?;
        }
        Some(Commands::User { command }) => {
            heartecho::cli::user::run(&cli.config, command).await?;
        }
        Some(Commands::Feature { story_id, off }) => {
            heartecho::cli::feature::run(&cli.config, story_id, off).await?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
