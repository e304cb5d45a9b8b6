//! `visitlog` - CLI for the visitor logging backend
//!
//! This binary runs the HTTP server and provides administrative commands
//! for bootstrapping operators and inspecting stored records.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use visitlog::auth::hash_password;
use visitlog::cli::{Cli, Command, ConfigCommand, UserCommand, VisitCommand};
use visitlog::models::{NewUser, Role};
use visitlog::{init_logging, Config, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let mut config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(serve) => {
            if let Some(host) = serve.host {
                config.server.host = host;
            }
            if let Some(port) = serve.port {
                config.server.port = port;
            }
            config.validate()?;
            visitlog::api::serve(config).await?;
        }
        Command::User(user_cmd) => handle_user(&config, user_cmd)?,
        Command::Visit(visit_cmd) => handle_visit(&config, &visit_cmd)?,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json)?,
        Command::Config(config_cmd) => handle_config(&config, config_cmd)?,
    }
    Ok(())
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn handle_user(config: &Config, cmd: UserCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        UserCommand::Create {
            login,
            password,
            role,
            full_name,
        } => {
            let new = NewUser {
                login,
                password,
                role: Role::from(role),
                full_name,
            };
            new.validate()?;
            let hash = hash_password(&new.password)?;
            let user =
                storage.insert_user(&new.login, &hash, new.role, new.full_name.as_deref())?;
            println!("Created {} account {} (id {})", user.role, user.login, user.id);
        }
        UserCommand::Disable { login } => set_active(&storage, &login, false)?,
        UserCommand::Enable { login } => set_active(&storage, &login, true)?,
        UserCommand::List { json } => {
            let users = storage.list_users()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                println!("{:<6} {:<20} {:<8} {:<8} Name", "ID", "Login", "Role", "Active");
                for user in users {
                    println!(
                        "{:<6} {:<20} {:<8} {:<8} {}",
                        user.id,
                        user.login,
                        user.role,
                        user.is_active,
                        user.full_name.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

fn set_active(storage: &Storage, login: &str, active: bool) -> anyhow::Result<()> {
    let user = storage
        .get_user_by_login(login)?
        .with_context(|| format!("no operator named {login}"))?;
    storage.set_user_active(user.id, active)?;
    println!(
        "{} account {login}",
        if active { "Enabled" } else { "Disabled" }
    );
    Ok(())
}

fn handle_visit(config: &Config, cmd: &VisitCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        VisitCommand::List { limit, open, json } => {
            let visits = storage.list_visits(*limit, *open)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&visits)?);
            } else {
                println!(
                    "{:<6} {:<20} {:<20} {:>9}  Photo",
                    "ID", "In", "Out", "Duration"
                );
                for visit in visits {
                    let time_out = visit
                        .time_out
                        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
                    let duration = visit
                        .duration_seconds
                        .map_or_else(|| "-".to_string(), |s| format!("{s}s"));
                    println!(
                        "{:<6} {:<20} {:<20} {:>9}  {}",
                        visit.id,
                        visit.time_in.format("%Y-%m-%d %H:%M:%S"),
                        time_out,
                        duration,
                        visit.photo_path
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "photo_dir": config.photo_dir(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("visitlog status");
        println!("---------------");
        println!("Database:        {}", config.database_path().display());
        println!("Photos:          {}", config.photo_dir().display());
        println!("Database size:   {} bytes", stats.db_size_bytes);
        println!();
        println!("Users:           {}", stats.users);
        println!("Cameras:         {}", stats.cameras);
        println!(
            "Visitors:        {} ({} inside)",
            stats.visitors, stats.visitors_inside
        );
        println!("Visits:          {} ({} open)", stats.visits, stats.open_visits);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_address());
                println!("  CORS any origin:    {}", config.server.cors_allow_any_origin);
                println!("  Max upload bytes:   {}", config.server.max_upload_bytes);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Photo directory:    {}", config.photo_dir().display());
                println!();
                println!("[Auth]");
                println!(
                    "  Secret key:         {}",
                    if config.auth.secret_key.is_some() {
                        "set"
                    } else {
                        "development default"
                    }
                );
                println!("  Token expiry (min): {}", config.auth.token_expiry_minutes);
                println!();
                println!("[Camera]");
                println!("  Snapshot timeout:   {}s", config.camera.snapshot_timeout_secs);
                println!("  Snapshot paths:     {}", config.camera.snapshot_paths.join(", "));
                println!("  Cloud account:      {}", config.camera.cloud.is_some());
                println!();
                println!("[Vision]");
                println!("  Detector:           {:?}", config.vision.detector);
                println!("  Match threshold:    {}", config.vision.match_threshold);
                println!("  JPEG quality:       {}", config.vision.jpeg_quality);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
