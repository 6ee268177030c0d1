use anyhow::Result;
use clap::Parser;
use lamportcast::{client, server, Cli, Commands};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    match cli.command {
        Commands::Run(args) => {
            let config = args.resolve()?;
            server::run(config).await
        }
        Commands::Send { node, payload } => {
            let id = client::send(&node, payload).await?;
            println!("{id}");
            Ok(())
        }
        Commands::Status { node } => {
            let status = client::status(&node).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise info, debug with -v, trace with -vv
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
