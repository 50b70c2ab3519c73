use clap::{Parser, Subcommand};
use rag_gate::Result;
use rag_gate::commands::{ingest, serve, show_config};
use rag_gate::config::{Config, load_env_file};

#[derive(Parser)]
#[command(name = "rag-gate")]
#[command(about = "Retrieval question answering behind an allow-list similarity gate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the configured sources and build the vector index
    Ingest,
    /// Start the HTTP query service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    load_env_file();
    let config = Config::load()?;

    match cli.command {
        Commands::Ingest => {
            ingest(&config).await?;
        }
        Commands::Serve { host, port } => {
            serve(&config, &host, port).await?;
        }
        Commands::Config => {
            show_config(&config);
        }
    }

    Ok(())
}
