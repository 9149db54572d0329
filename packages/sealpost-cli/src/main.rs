//! Sealpost command-line client
//!
//! Sends and receives sealed messages against either the in-memory
//! collaborators or a live Ethereum node plus IPFS.
//!
//! ```text
//! sealpost keygen
//! sealpost lookup-key 0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266
//! sealpost directory
//! sealpost --mode live send --from 0x71C7… --to Bob --key <hex> "hello"
//! sealpost --mode live listen --as 0xf39F…
//! sealpost demo
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use sealpost_core::{LookupScheme, Mode, SealpostConfig};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sealpost", version, about = "Encrypted messages over a public ledger")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SEALPOST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Collaborators to use: "simulated" or "live"
    #[arg(long, env = "SEALPOST_MODE", global = true)]
    mode: Option<Mode>,

    /// Lookup key scheme: "legacy" or "domain_separated"
    #[arg(long, env = "SEALPOST_LOOKUP_SCHEME", global = true)]
    lookup_scheme: Option<LookupScheme>,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, env = "SEALPOST_RPC_URL", global = true)]
    rpc_url: Option<String>,

    /// Pointer contract address
    #[arg(long, env = "SEALPOST_CONTRACT", global = true)]
    contract: Option<String>,

    /// IPFS HTTP API base URL
    #[arg(long, env = "SEALPOST_IPFS_API", global = true)]
    ipfs_api: Option<String>,

    /// IPFS gateway base URL
    #[arg(long, env = "SEALPOST_IPFS_GATEWAY", global = true)]
    ipfs_gateway: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a session key pair and print its public key
    Keygen,

    /// Derive the lookup key for an address or a storage identifier
    LookupKey {
        /// Address (or content identifier with --cid)
        input: String,

        /// Treat the input as a content identifier
        #[arg(long)]
        cid: bool,
    },

    /// List the configured address book
    Directory,

    /// Encrypt, store, and announce a message
    Send {
        /// Sender address (must be unlocked on the node in live mode)
        #[arg(long, env = "SEALPOST_FROM")]
        from: String,

        /// Recipient name or address
        #[arg(long)]
        to: String,

        /// Recipient's session public key (hex); defaults to the directory entry
        #[arg(long)]
        key: Option<String>,

        /// Message text
        message: String,
    },

    /// Follow the inbox of an address until interrupted
    Listen {
        /// Address whose inbox to follow
        #[arg(long = "as", env = "SEALPOST_ADDRESS")]
        address: String,
    },

    /// Run a fully simulated exchange between the demo users
    Demo {
        /// Text Alice sends to Bob
        #[arg(default_value = "hello")]
        message: String,
    },
}

impl Cli {
    fn load_config(&self) -> Result<SealpostConfig> {
        let mut config = match &self.config {
            Some(path) => SealpostConfig::from_file(path)?,
            None => SealpostConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(scheme) = self.lookup_scheme {
            config.lookup_scheme = scheme;
        }
        if let Some(url) = &self.rpc_url {
            config.network.rpc_url = url.clone();
        }
        if let Some(contract) = &self.contract {
            config.network.contract_address = contract.parse()?;
        }
        if let Some(url) = &self.ipfs_api {
            config.ipfs.api_url = url.clone();
        }
        if let Some(url) = &self.ipfs_gateway {
            config.ipfs.gateway_url = url.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealpost=info,sealpost_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing::debug!(mode = %config.mode, scheme = %config.lookup_scheme, "Configuration ready");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.command {
            Command::Keygen => commands::keygen(cli.json),
            Command::LookupKey { input, cid } => commands::lookup_key(&config, &input, cid, cli.json),
            Command::Directory => commands::directory(&config, cli.json),
            Command::Send {
                from,
                to,
                key,
                message,
            } => commands::send(&config, &from, &to, key.as_deref(), &message, cli.json).await,
            Command::Listen { address } => commands::listen(&config, &address, cli.json).await,
            Command::Demo { message } => commands::demo(&config, &message, cli.json).await,
        }
    })
}
