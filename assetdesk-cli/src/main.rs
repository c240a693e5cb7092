//! AssetDesk CLI - Operator command line for the admin frontend session
//!
//! Hosts the session manager against the file-backed credential slot, so a
//! login here is picked up by anything sharing the same credentials file.

mod console;

use anyhow::{anyhow, bail, Context};
use assetdesk_auth::{Decision, FileCredentialStore, RouteGuard, Session, SessionManager};
use assetdesk_core::{init_logging, DeskConfig, GuardMode, LoggingConfig};
use clap::{Parser, Subcommand};
use console::{ConsoleNavigator, ConsoleNotifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "assetdesk")]
#[command(about = "Session tooling for the AssetDesk admin frontend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the issued tokens
    Login {
        #[arg(short, long)]
        username: String,

        /// Password; falls back to ASSETDESK_PASSWORD, then a prompt
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and forget the stored tokens
    Logout,

    /// Restore the stored session and describe it
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the password of the signed-in user
    ChangePassword {
        #[arg(long)]
        current: Option<String>,

        #[arg(long)]
        new: Option<String>,
    },

    /// Show what the route guard decides for a path
    Route {
        /// Application path, e.g. /admin/users
        path: String,

        /// Answer with redirects instead of inline screens
        #[arg(long)]
        redirect: bool,
    },

    /// Keep the session checked and print every change
    Watch,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

struct App {
    config: DeskConfig,
    manager: SessionManager,
}

impl App {
    fn load(config_path: Option<&Path>, verbose: bool) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;
        init_cli_logging(&config.logging, verbose)?;
        info!("Starting AssetDesk CLI v{}", env!("CARGO_PKG_VERSION"));

        let credentials_path = config.storage.resolved_credentials_path();
        let store = FileCredentialStore::new(&credentials_path).with_context(|| {
            format!(
                "Failed to open credential store at {}",
                credentials_path.display()
            )
        })?;

        let manager = SessionManager::http(&config, Arc::new(store))?
            .navigator(Arc::new(ConsoleNavigator))
            .notifier(Arc::new(ConsoleNotifier))
            .build();

        Ok(Self { config, manager })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config {
            show,
            init,
            validate,
        } => {
            init_cli_logging(&LoggingConfig::default(), cli.verbose)?;
            handle_config(config_path, show, init, validate)
        }
        Commands::Login { username, password } => {
            let app = App::load(config_path, cli.verbose)?;
            handle_login(&app, &username, password).await
        }
        Commands::Logout => {
            // No initialize: a failed restore would drop the token before it is invalidated
            let app = App::load(config_path, cli.verbose)?;
            app.manager.logout().await;
            Ok(())
        }
        Commands::Status { json } => {
            let app = App::load(config_path, cli.verbose)?;
            handle_status(&app, json).await
        }
        Commands::ChangePassword { current, new } => {
            let app = App::load(config_path, cli.verbose)?;
            handle_change_password(&app, current, new).await
        }
        Commands::Route { path, redirect } => {
            let app = App::load(config_path, cli.verbose)?;
            handle_route(&app, &path, redirect).await
        }
        Commands::Watch => {
            let app = App::load(config_path, cli.verbose)?;
            handle_watch(&app).await
        }
    }
}

fn init_cli_logging(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let mut logging = logging.clone();
    if verbose {
        logging.level = "debug".to_string();
    }
    init_logging(&logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("assetdesk").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("assetdesk.toml"))
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<DeskConfig> {
    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => [
            dirs::config_dir().map(|d| d.join("assetdesk").join("config.toml")),
            dirs::home_dir().map(|d| d.join(".assetdesk").join("config.toml")),
            Some(PathBuf::from("assetdesk.toml")),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.exists()),
    };

    if let Some(path) = &path {
        info!("Loading configuration from {:?}", path);
    } else {
        info!("No configuration file found, using defaults");
    }

    DeskConfig::load(path.as_deref()).map_err(|e| {
        e.log();
        anyhow::Error::from(e)
    })
}

fn handle_config(
    config_path: Option<&Path>,
    show: bool,
    init: bool,
    validate: bool,
) -> anyhow::Result<()> {
    if init {
        let target = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        DeskConfig::default().save_to_file(&target)?;
        println!("✅ Configuration initialized at: {:?}", target);
    }

    if show {
        let config = load_config(config_path)?;
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        match load_config(config_path) {
            Ok(_) => println!("✅ Configuration is valid"),
            Err(e) => bail!("Configuration is invalid: {:#}", e),
        }
    }

    if !(init || show || validate) {
        println!("Nothing to do: pass --show, --init or --validate");
    }
    Ok(())
}

async fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn handle_login(app: &App, username: &str, password: Option<String>) -> anyhow::Result<()> {
    let password = match password.or_else(|| std::env::var("ASSETDESK_PASSWORD").ok()) {
        Some(password) => password,
        None => prompt("Password: ").await?,
    };

    app.manager.initialize().await;
    let user = app
        .manager
        .login(username, &password)
        .await
        .context("Login failed")?;

    println!(
        "Signed in as {} [{}]",
        user.display_name(),
        user.roles.as_slice().join(", ")
    );
    if user.must_change_password {
        println!("🔑 A password change is required: run `assetdesk change-password`");
    }
    Ok(())
}

async fn handle_status(app: &App, json: bool) -> anyhow::Result<()> {
    let state = app.manager.initialize().await;
    let session = app.manager.snapshot();
    let landing = session.user().map(|u| app.manager.landing_route(u));

    if json {
        let value = serde_json::json!({
            "state": state,
            "user": session.user(),
            "landing_route": landing,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("State: {}", state);
    if let Some(user) = session.user() {
        println!("User: {} (id {})", user.display_name(), user.id);
        println!("Roles: {}", user.roles.as_slice().join(", "));
        if let Some(landing) = landing {
            println!("Landing route: {}", landing);
        }
    }
    Ok(())
}

async fn handle_change_password(
    app: &App,
    current: Option<String>,
    new: Option<String>,
) -> anyhow::Result<()> {
    app.manager.initialize().await;
    if !app.manager.is_authenticated() {
        bail!("Not signed in: run `assetdesk login` first");
    }

    let current = match current {
        Some(current) => current,
        None => prompt("Current password: ").await?,
    };
    let new = match new {
        Some(new) => new,
        None => prompt("New password: ").await?,
    };

    app.manager
        .change_password(&current, &new)
        .await
        .context("Password change failed")?;
    Ok(())
}

fn describe(decision: &Decision) -> String {
    match decision {
        Decision::ShowLoading => "show loading indicator".to_string(),
        Decision::ShowLogin => "show login screen".to_string(),
        Decision::ShowPasswordChange => "show password change screen".to_string(),
        Decision::ShowContent => "show content".to_string(),
        Decision::Redirect(path) => format!("redirect to {}", path),
    }
}

async fn handle_route(app: &App, path: &str, redirect: bool) -> anyhow::Result<()> {
    app.manager.initialize().await;

    let mut guard = RouteGuard::from_config(&app.config.routing);
    if redirect {
        guard = guard.with_mode(GuardMode::Redirect);
    }

    let required = guard.table().requirement_for(path);
    let decision = guard.decide_path(&app.manager.snapshot(), path);

    println!("Route: {}", path);
    if required.is_empty() {
        println!("Requires: any signed-in user");
    } else {
        println!("Requires one of: {}", required.join(", "));
    }
    println!("Decision: {}", describe(&decision));
    Ok(())
}

fn print_session(session: &Session) {
    match session.user() {
        Some(user) => println!(
            "🔄 {} as {} [{}]",
            session.state(),
            user.display_name(),
            user.roles.as_slice().join(", ")
        ),
        None => println!("🔄 {}", session.state()),
    }
}

async fn handle_watch(app: &App) -> anyhow::Result<()> {
    app.manager.initialize().await;
    app.manager.start_monitoring();
    info!(
        interval_secs = app.config.session.check_interval_secs,
        "Watching session, press Ctrl-C to stop"
    );

    let mut updates = app.manager.subscribe();
    print_session(&updates.borrow_and_update());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = updates.borrow_and_update().clone();
                print_session(&session);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping session watch");
                break;
            }
        }
    }

    app.manager.shutdown().await;
    Ok(())
}
