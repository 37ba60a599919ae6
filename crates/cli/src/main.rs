use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "trade-relay")]
#[command(about = "Signal execution and monitoring engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring engine until interrupted
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Parse alert text and print the extracted signals as JSON
    Parse {
        /// Alert text; stdin is read when omitted
        text: Option<String>,
    },
    /// Execute alert text for one subscriber and monitor it to completion
    Execute {
        /// Alert text
        text: String,
        /// Exchange to execute on ("hyperliquid" or "bybit")
        #[arg(short, long)]
        exchange: String,
        /// API key or wallet address
        #[arg(long, env = "TRADE_RELAY_API_KEY")]
        api_key: String,
        /// API secret or wallet private key
        #[arg(long, env = "TRADE_RELAY_API_SECRET", hide_env_values = true)]
        api_secret: String,
        /// Margin in quote currency per signal
        #[arg(long, default_value = "100")]
        fixed_amount: String,
        /// Use the venue testnet
        #[arg(long)]
        testnet: bool,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Query the account balance for credentials from the environment
    Balance {
        /// Exchange to query ("hyperliquid" or "bybit")
        #[arg(short, long)]
        exchange: String,
        /// API key or wallet address
        #[arg(long, env = "TRADE_RELAY_API_KEY")]
        api_key: String,
        /// API secret or wallet private key
        #[arg(long, env = "TRADE_RELAY_API_SECRET", hide_env_values = true)]
        api_secret: String,
        /// Use the venue testnet
        #[arg(long)]
        testnet: bool,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => commands::run(&config).await,
        Commands::Parse { text } => commands::parse(text),
        Commands::Execute {
            text,
            exchange,
            api_key,
            api_secret,
            fixed_amount,
            testnet,
            config,
        } => {
            commands::execute(
                &text,
                &exchange,
                &api_key,
                &api_secret,
                &fixed_amount,
                testnet,
                &config,
            )
            .await
        }
        Commands::Balance {
            exchange,
            api_key,
            api_secret,
            testnet,
            config,
        } => commands::balance(&exchange, &api_key, &api_secret, testnet, &config).await,
    }
}
