//! agc - command line entry point.
//!
//! `agc <PROMPT...>` runs one agent loop and prints the answer. Subcommands
//! start the HTTP server and manage configuration and Google sign-in.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agc::agent::{Agent, LoopOutcome, RunContext};
use agc::auth::{self, oauth::id_token_claims, AuthBackend, Session, User, LOCAL_IDENTITY};
use agc::api;
use agc::config::{self, Config, ConfigError};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agc", version, about = "Manage Google Calendar in plain language")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to use for this prompt
    #[arg(long, short)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// What to do, e.g. "lunch with Sam tomorrow at noon"
    prompt: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Read or change the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Google sign-in for the CLI
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set KEY to VALUE in the config file
    Set { key: String, value: String },
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Print the Google consent URL
    Url,
    /// Exchange an authorization code and store the local session
    Login {
        #[arg(long)]
        code: String,
    },
    /// Delete the local session
    Logout,
    /// Print a fresh token encryption key
    Keygen,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the answer.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agc=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config.clone().or_else(config::default_config_path);

    match cli.command {
        Some(Commands::Serve) => {
            let config = Config::load(cli.config.as_deref())?;
            info!("Loaded configuration: model={}", config.model);
            api::serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config { action }) => {
            config_command(action, config_path.as_deref(), cli.config.as_deref())
        }
        Some(Commands::Auth { action }) => {
            let config = Config::load(cli.config.as_deref())?;
            auth_command(action, &config).await
        }
        None if cli.prompt.is_empty() => {
            anyhow::bail!("no prompt given; try `agc --help`")
        }
        None => {
            let config = Config::load(cli.config.as_deref())?;
            prompt_command(&config, cli.model, &cli.prompt.join(" ")).await
        }
    }
}

async fn prompt_command(
    config: &Config,
    model: Option<String>,
    prompt: &str,
) -> anyhow::Result<ExitCode> {
    let backend = AuthBackend::from_config(config)?;
    let agent = Agent::from_config(config, backend.credentials)?;
    let model = model.unwrap_or_else(|| config.model.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let ctx = RunContext::with_cancellation(LOCAL_IDENTITY, cancel);
    let outcome = agent.run(&ctx, &model, Vec::new(), prompt).await;

    let code = match &outcome {
        LoopOutcome::FinalAnswer(answer) => {
            println!("{}", answer);
            return Ok(ExitCode::SUCCESS);
        }
        LoopOutcome::StepLimitExceeded { .. } => ExitCode::from(2),
        LoopOutcome::Cancelled => ExitCode::from(130),
        LoopOutcome::Failure(_) => ExitCode::FAILURE,
    };
    eprintln!("Error: {}", outcome.error_message().unwrap_or_default());
    Ok(code)
}

fn config_command(
    action: ConfigAction,
    path: Option<&Path>,
    explicit: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Set { key, value } => {
            let path = path.ok_or(ConfigError::NoConfigDir)?;
            config::set_value(path, &key, &value)?;
            println!("Set {} in {}", key, path.display());
        }
        ConfigAction::Show => {
            print!("{}", Config::load(explicit)?.describe());
        }
        ConfigAction::Path => {
            let path = path.ok_or(ConfigError::NoConfigDir)?;
            println!("{}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn auth_command(action: AuthAction, config: &Config) -> anyhow::Result<ExitCode> {
    let oauth = |backend: &AuthBackend| {
        backend.oauth.clone().ok_or_else(|| {
            anyhow::anyhow!("set google_client_id and google_client_secret first")
        })
    };

    match action {
        AuthAction::Keygen => {
            println!("{}", auth::crypto::generate_key());
        }
        AuthAction::Url => {
            let backend = AuthBackend::from_config(config)?;
            let mut nonce = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut nonce);
            println!("{}", oauth(&backend)?.authorize_url(&hex::encode(nonce))?);
        }
        AuthAction::Login { code } => {
            let backend = AuthBackend::from_config(config)?;
            let token = oauth(&backend)?.exchange_code(&code).await?;

            let user = match token.id_token.as_deref() {
                Some(id_token) => {
                    let claims = id_token_claims(id_token)?;
                    User {
                        user_id: claims.sub,
                        email: claims.email,
                        name: claims.name,
                    }
                }
                None => User {
                    user_id: LOCAL_IDENTITY.to_string(),
                    email: String::new(),
                    name: String::new(),
                },
            };
            backend.store.upsert_user(&user)?;
            backend.store.put_session(&Session {
                session_id: LOCAL_IDENTITY.to_string(),
                user_id: user.user_id.clone(),
                access_token: token.access_token.clone(),
                refresh_token: token.refresh_token.clone(),
                expires_at: token.expires_at(Utc::now()),
            })?;

            if token.refresh_token.is_none() {
                tracing::warn!("Google returned no refresh token; you will need to sign in again when the access token expires");
            }
            let who = if user.email.is_empty() {
                &user.user_id
            } else {
                &user.email
            };
            println!("Signed in as {}", who);
        }
        AuthAction::Logout => {
            let backend = AuthBackend::from_config(config)?;
            if backend.store.delete_session(LOCAL_IDENTITY)? {
                println!("Signed out");
            } else {
                println!("No local session");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
