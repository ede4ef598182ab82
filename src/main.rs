use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vpn_helper::protocol::Command;
use vpn_helper::{HelperConfig, HelperServer};

#[derive(Parser)]
#[command(name = "vpn-helper")]
#[command(about = "Privileged split-tunnel helper for the VPN client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the helper and accept commands on the local socket
    Serve {
        /// Config file (defaults to ./vpn-helper.toml, then the user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the socket path from the config
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
    /// Generate default config file
    Init {
        #[arg(short, long, default_value = "vpn-helper.toml")]
        path: PathBuf,
    },
    /// Ask a running helper for its version
    Version {
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
    /// Ask a running helper whether the firewall is on
    FirewallState {
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Serve { config, .. } => config.clone(),
        _ => None,
    };
    let config = match &config_path {
        Some(path) => HelperConfig::load(path)?,
        None => HelperConfig::load_or_default()?,
    };

    // RUST_LOG wins over --verbose and the config level
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { socket, .. } => {
            let socket_path = socket.unwrap_or_else(|| config.server.socket_path.clone());
            info!("Starting helper v{}", env!("CARGO_PKG_VERSION"));

            let server = Arc::new(HelperServer::from_config(&config)?);
            if let Err(e) = server.run(&socket_path, shutdown_signal()).await {
                error!("Helper failed: {}", e);
                std::process::exit(1);
            }
            info!("Helper stopped");
        }
        Commands::Init { path } => {
            info!("Generating default config...");
            HelperConfig::default().save(&path)?;
            println!("Created default config: {}", path.display());
        }
        Commands::Version { socket } => {
            let socket_path = socket.unwrap_or(config.server.socket_path);
            let mut client = vpn_helper::client::connect(&socket_path).await?;
            let result = client.send(&Command::GetHelperVersion).await?;
            println!("Helper version: {}", result.additional_string);
        }
        Commands::FirewallState { socket } => {
            let socket_path = socket.unwrap_or(config.server.socket_path);
            let mut client = vpn_helper::client::connect(&socket_path).await?;
            let result = client.send(&Command::FirewallActualState).await?;
            if !result.success {
                error!("Helper could not report firewall state");
                std::process::exit(1);
            }
            println!(
                "Firewall: {}",
                if result.exit_code == 1 { "on" } else { "off" }
            );
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
