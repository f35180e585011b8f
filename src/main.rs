//! `ginkgo-talk` host binary.
//!
//! Parses the command line, sets up logging, assembles the server and
//! runs it until Ctrl+C or SIGTERM.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ginkgo_talk::config::{DEFAULT_PORT, ServerOptions, SettingsStore};
use ginkgo_talk::events::ConsoleAdapter;
use ginkgo_talk::identity::IdentityManager;
use ginkgo_talk::net::AddressResolver;
use ginkgo_talk::services::{ChatTransform, CommandInjector};
use ginkgo_talk::transport::{Server, ServerState};

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "ginkgo-talk")]
#[command(version)]
#[command(about = "Type on this computer from your phone over the local network")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Directory for the certificate and settings (defaults to the executable's directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// LAN address to advertise instead of auto-detecting ("auto" to detect)
    #[arg(long, env = "GTALK_LAN_IP")]
    lan_ip: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> ServerOptions {
        let mut options = ServerOptions::new().with_port(self.port).with_bind(self.bind);
        if let Some(dir) = &self.data_dir {
            options = options.with_data_dir(dir);
        }
        if let Some(lan_ip) = &self.lan_ip {
            options = options.with_lan_override(lan_ip);
        }
        options
    }
}

// ============================================================================
// Functions
// ============================================================================

fn init_logging(verbose: bool) {
    let default = if verbose {
        "ginkgo_talk=debug"
    } else {
        "ginkgo_talk=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Operator override, then settings file, then auto-detection.
fn build_resolver(options: &ServerOptions, settings: &SettingsStore) -> AddressResolver {
    let cli_override = options.lan_override_addr().unwrap_or_else(|e| {
        warn!(error = %e, value = ?options.lan_override, "Ignoring LAN override");
        None
    });

    AddressResolver::system().with_override(cli_override.or_else(|| settings.lan_override()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run(cli: Cli) -> ginkgo_talk::Result<()> {
    let options = cli.options();
    let settings = Arc::new(SettingsStore::load(options.data_dir()));
    let resolver = build_resolver(&options, &settings);

    let lan = resolver.resolve();
    info!(lan = %lan, data_dir = %options.data_dir().display(), "Starting");

    let identity = IdentityManager::new(options.data_dir()).obtain(&lan)?;
    let transform = Arc::new(ChatTransform::new(settings.clone())?);
    let injector = Arc::new(CommandInjector::for_host());
    info!(backend = ?injector.backend(), ai = settings.is_transform_available(), "Services ready");

    let state = ServerState::new(options.port, resolver, settings, transform, injector);
    let server = Server::bind(options.listen_addr(), identity.server_config()?, state).await?;

    let console = ConsoleAdapter::new(server.state().events.subscribe(), std::io::stdout());
    tokio::spawn(console.run());

    tokio::select! {
        () = server.run() => {}
        () = shutdown_signal() => info!("Shutting down"),
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal");
            std::process::ExitCode::FAILURE
        }
    }
}
