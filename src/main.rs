use std::path::PathBuf;
use std::sync::Arc;

use byway_oauth::{
    AppConfig, MemoryStore, OAuthError, OAuthRoute, ProviderSet, ReqwestClient, RequestContext,
    ServiceRegistry, ServiceType,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "byway-oauth",
    about = "Serve OAuth 1.0a / 2.0 login routes for the services in a TOML config."
)]
struct Cli {
    /// Configuration file.
    #[arg(long, short, default_value = "oauth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the auth, callback and fake_login routes.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the authorization URL for one service.
    Url {
        /// `10` / `1.0` or `20` / `2.0`.
        service_type: String,
        service_name: String,
        /// Open the URL in the default browser.
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), OAuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let providers = ProviderSet::builtin();
    let registry = config.build_registry(Arc::new(ReqwestClient::new()), &providers)?;

    match cli.command {
        Command::Serve { bind } => run_serve(config, registry, providers, bind).await,
        Command::Url {
            service_type,
            service_name,
            open,
        } => run_url(&registry, &service_type, &service_name, open).await,
    }
}

async fn run_serve(
    config: AppConfig,
    registry: ServiceRegistry,
    providers: ProviderSet,
    bind: Option<String>,
) -> Result<(), OAuthError> {
    let bind = bind.unwrap_or(config.server.bind);
    tracing::info!(services = registry.len(), "registry loaded");

    let route = OAuthRoute::new(
        Arc::new(registry),
        Arc::new(MemoryStore::new()),
        Arc::new(providers),
    )
    .with_config(config.route);

    byway_oauth::serve(Arc::new(route), &bind).await
}

async fn run_url(
    registry: &ServiceRegistry,
    service_type: &str,
    service_name: &str,
    open: bool,
) -> Result<(), OAuthError> {
    let service_type: ServiceType = service_type.parse()?;
    let permission = registry
        .permission(service_type, service_name)
        .ok_or_else(|| OAuthError::ServiceUnknown {
            service_type: service_type.to_string(),
            service_name: service_name.to_string(),
        })?;
    let context = RequestContext::new(permission.key().clone());
    let permission = registry.finetune_permission(&context, permission);
    let url = permission.authorization_url().await?;

    println!("{url}");
    if open {
        if let Err(err) = webbrowser::open(&url) {
            eprintln!("Failed to open browser automatically: {err}");
        }
    }
    Ok(())
}
