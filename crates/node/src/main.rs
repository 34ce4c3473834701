// node/src/main.rs
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dag-node")]
#[command(about = "DAG consensus node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node, applying every record currently on disk through
    /// consensus and then waiting for a shutdown signal.
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Override data directory
        #[arg(short, long)]
        data_dir: Option<String>,
    },

    /// Initialize a new node's data directory and default config
    Init {
        /// Data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: String,
    },

    /// Show the current best chain height and tip hashes
    Status {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_PKG_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Start { config, data_dir } => start_node(&config, data_dir).await?,
        Commands::Init { data_dir } => init_node(&data_dir)?,
        Commands::Status { config } => show_status(&config)?,
    }

    Ok(())
}

async fn start_node(config_path: &str, data_dir_override: Option<String>) -> anyhow::Result<()> {
    use node::{Node, NodeConfig};

    tracing::info!(path = config_path, "loading configuration");
    let mut config = NodeConfig::from_file(config_path)?;
    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }

    tracing::info!(data_dir = %config.data_dir, "starting node");
    let node = Node::new(config)?;
    node.ensure_genesis()?;

    tracing::info!("node is running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal, stopping");

    Ok(())
}

fn init_node(data_dir: &str) -> anyhow::Result<()> {
    tracing::info!(data_dir, "initializing node");

    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(format!("{}/db", data_dir))?;

    let mut config = node::NodeConfig::default();
    config.data_dir = data_dir.to_string();
    config.to_file(&format!("{}/config.toml", data_dir))?;

    tracing::info!("node initialized at {}, edit {}/config.toml to configure it", data_dir, data_dir);
    Ok(())
}

fn show_status(config_path: &str) -> anyhow::Result<()> {
    use node::{Node, NodeConfig};

    let config = NodeConfig::from_file(config_path)?;
    let node = Node::new(config)?;
    let status = node.status()?;

    println!("height: {}", status.height);
    println!("best tips:");
    for tip in status.best_tips {
        println!("  {}", tip);
    }
    Ok(())
}
