//! socportal CLI - Command-line client for the security-operations portals
//!
//! Logs in against the backend, keeps the session on disk and queries the
//! portal collections through the authenticated request pipeline

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use socportal_client::{Navigator, PortalClient, ResourceKind};
use socportal_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, LoggingConfig,
    PortalConfig, PortalKind,
};
use socportal_session::{decode_claims, expires_in_at, open_session_storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "socportal")]
#[command(about = "Authenticated client for the security-operations portals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Portal to act for (admin or customer)
    #[arg(short, long, global = true)]
    portal: Option<PortalKind>,

    /// Directory holding the persisted session
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(short, long, env = "SOCPORTAL_USERNAME")]
        username: Option<String>,

        /// Read from stdin when not given
        #[arg(long, env = "SOCPORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Drop the stored session
    Logout,

    /// Show the current session
    Status,

    /// Exchange the current token for a fresh one
    Refresh,

    /// Fetch a resource collection or a single item
    Get {
        /// agents, alerts, cases, vulnerabilities, indices or pipelines
        resource: ResourceKind,

        /// Item id; lists the collection when omitted
        id: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

/// Prints where the portal UI would navigate to
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn current_path(&self) -> String {
        "/".to_string()
    }

    fn redirect(&self, location: &str) {
        info!(location, "Redirect requested");
        if let Some(message) = location
            .split_once("?message=")
            .map(|(_, message)| decode_message(message))
        {
            eprintln!("⛔ Access denied: {}", message);
        } else if location.contains("logout") {
            eprintln!("🔒 Session expired, run 'socportal login' again");
        } else {
            eprintln!("➡️  {}", location);
        }
    }
}

fn decode_message(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig {
            level: "warn".to_string(),
            filter_directives: Vec::new(),
            ..Default::default()
        }
    };
    init_logging(&logging_config).context("Failed to initialize logging")?;

    info!("Starting socportal CLI v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config {
        init,
        show,
        validate,
    } = cli.command
    {
        return handle_config(cli.config, init, show, validate);
    }

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(portal) = cli.portal {
        config.portal = portal;
    }
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(PortalConfig::default_data_dir);

    let storage = open_session_storage(&config, &data_dir)
        .with_context(|| format!("Failed to open session storage in {}", data_dir.display()))?;
    let client = PortalClient::new(config, storage, Arc::new(ConsoleNavigator))?;
    client.restore().await;

    let result = match cli.command {
        Commands::Login { username, password } => handle_login(&client, username, password).await,
        Commands::Logout => {
            client.logout().await;
            println!("👋 Logged out");
            Ok(())
        }
        Commands::Status => handle_status(&client).await,
        Commands::Refresh => handle_refresh(&client).await,
        Commands::Get { resource, id } => handle_get(&client, resource, id).await,
        Commands::Config { .. } => Ok(()),
    };

    // the runtime goes away with main; let a background refresh store its token
    client.pipeline().wait_for_refresh().await;
    result
}

fn load_config(config_path: Option<&PathBuf>) -> Result<PortalConfig> {
    let path = match config_path {
        Some(path) => Some(path.clone()),
        None => Some(PortalConfig::default_path()).filter(|path| path.exists()),
    };

    match &path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }
    Ok(PortalConfig::load(path.as_deref())?)
}

async fn handle_login(
    client: &PortalClient,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let theme = ColorfulTheme::default();
    let username = given_or_ask(username, || {
        Input::<String>::with_theme(&theme)
            .with_prompt("Username")
            .interact_text()
            .context("Failed to read username")
    })?;
    // not echoed
    let password = given_or_ask(password, || {
        Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()
            .context("Failed to read password")
    })?;

    log_operation_start!("cli_login", username = %username);
    match client.login(&username, &password).await {
        Ok(user) => {
            log_operation_success!("cli_login");
            println!("✅ Logged in as {} ({})", user.username, user.role);
            Ok(())
        }
        Err(e) => {
            log_operation_error!("cli_login", e);
            let message = client
                .session()
                .last_error()
                .await
                .unwrap_or_else(|| e.user_message());
            bail!("❌ {}", message)
        }
    }
}

fn given_or_ask(value: Option<String>, ask: impl FnOnce() -> Result<String>) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => ask(),
    }
}

async fn handle_status(client: &PortalClient) -> Result<()> {
    let store = client.session();
    let session = store.session().await;

    println!("Portal:  {}", client.config().portal);
    println!("Backend: {}", client.config().api.base_url);
    println!("Phase:   {}", store.phase().await);

    let (Some(user), Some(token)) = (session.user, session.token) else {
        println!("Not logged in");
        return Ok(());
    };

    println!("User:    {} ({}, id {})", user.username, user.role, user.id);
    match expires_in_at(&token, Utc::now()) {
        Some(seconds) if seconds > 0 => {
            println!("Token:   expires in {}m {}s", seconds / 60, seconds % 60)
        }
        Some(_) => println!("Token:   expired"),
        None => println!("Token:   opaque (no expiry claim)"),
    }

    let mut scopes = user.scopes;
    if let Some(claims) = decode_claims(&token) {
        scopes.extend(claims.scope_set());
    }
    if !scopes.is_empty() {
        let scopes: Vec<String> = scopes.into_iter().collect();
        println!("Scopes:  {}", scopes.join(", "));
    }
    Ok(())
}

async fn handle_refresh(client: &PortalClient) -> Result<()> {
    client
        .session()
        .refresh()
        .await
        .context("Token refresh failed")?;
    println!("🔄 Token refreshed");
    Ok(())
}

async fn handle_get(
    client: &PortalClient,
    resource: ResourceKind,
    id: Option<String>,
) -> Result<()> {
    let resources = client.resource(resource);
    let output = match id {
        Some(id) => resources.get(&id).await?,
        None => serde_json::Value::Array(resources.list().await?),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_config(
    config_path: Option<PathBuf>,
    init: bool,
    show: bool,
    validate: bool,
) -> Result<()> {
    if !(init || show || validate) {
        bail!("Nothing to do: pass --init, --show or --validate");
    }

    if init {
        let path = config_path.clone().unwrap_or_else(PortalConfig::default_path);
        if path.exists() {
            bail!("Configuration already exists at {:?}", path);
        }
        PortalConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {:?}", path);
    }

    if show {
        let config = load_config(config_path.as_ref())?;
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        // load() already validates
        match load_config(config_path.as_ref()) {
            Ok(_) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
