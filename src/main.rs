use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "biostream=info",
        1 => "biostream=debug",
        _ => "biostream=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = cli.host.clone();
    let registry_port = cli.registry_port;
    let outcome = match cli.command {
        cli::Command::Launch(args) => commands::launch::execute(&host, registry_port, args).await,
        cli::Command::Registry(args) => {
            commands::registry::execute(&host, registry_port, args).await
        }
        cli::Command::Acquire(args) => commands::acquire::execute(&host, registry_port, args).await,
        cli::Command::Filter => commands::filter::execute(&host, registry_port).await,
        cli::Command::View(args) => commands::view::execute(&host, registry_port, args).await,
    };

    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}
