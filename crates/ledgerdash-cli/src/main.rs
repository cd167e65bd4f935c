//! Ledgerdash CLI - a terminal front end for the dashboard session layer.
//!
//! Signs in against the bookkeeping API, shows who is signed in and for how
//! long, issues authenticated requests and signs out. The session persists
//! between invocations in the user's cache directory.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgerdash_core::auth::SessionAuthority;
use ledgerdash_core::ports::{Navigator, Notice, Notifier, Route, SystemClock};
use ledgerdash_core::storage::FileStore;
use ledgerdash_core::utils::{format_countdown, format_expiry, welcome_line};
use ledgerdash_core::{ApiError, ApiGateway, AuthState, Config, RouteGuard};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable with the username to sign in as
const USERNAME_ENV: &str = "LEDGERDASH_USERNAME";

/// Environment variable with the password (skips the prompt)
const PASSWORD_ENV: &str = "LEDGERDASH_PASSWORD";

/// How often `watch` redraws the countdown
const WATCH_REFRESH: Duration = Duration::from_secs(1);

const USAGE: &str = "Usage: ledgerdash <command>

Commands:
  login [username]   Sign in and start a session
  logout             End the current session
  status             Show who is signed in and for how long
  get <path>         GET an API path with the current session
  watch              Show the session countdown until it ends";

/// Prints where the dashboard would go next.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn go_to(&self, route: &Route) {
        info!(%route, "Navigation requested");
        if route.is_public() {
            eprintln!("Not signed in. Run `ledgerdash login` to sign in.");
        }
    }
}

/// Shows notices on stderr.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}", notice.message());
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut config = Config::load().unwrap_or_else(|e| {
        error!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let storage = Arc::new(FileStore::new(config.session_path()?));
    let navigator = Arc::new(TerminalNavigator);
    let authority = SessionAuthority::with_clock(
        storage,
        navigator.clone(),
        Arc::new(SystemClock),
        config.expiry_check_interval(),
    )?;
    let guard = RouteGuard::new(authority.clone(), navigator);
    let gateway = ApiGateway::new(
        config.api_base_url.clone(),
        config.request_timeout(),
        authority,
        Arc::new(TerminalNotifier),
    )?;

    match command.as_str() {
        "login" => login(&gateway, &mut config, args.get(1).cloned()).await,
        "logout" => {
            gateway.logout();
            Ok(())
        }
        "status" => {
            print_status(gateway.authority());
            Ok(())
        }
        "get" => {
            let Some(path) = args.get(1) else {
                bail!("Missing path. {USAGE}");
            };
            match guard.render(&Route::new(path.as_str()), || get(&gateway, path)) {
                Some(request) => request.await,
                None => Ok(()),
            }
        }
        "watch" => match guard.render(&Route::dashboard(), || watch(gateway.authority())) {
            Some(countdown) => countdown.await,
            None => Ok(()),
        },
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("Unknown command `{other}`. {USAGE}"),
    }
}

async fn login(gateway: &ApiGateway, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .or_else(|| config.last_username.clone())
    {
        Some(username) => username,
        None => prompt("Username: ")?,
    };
    if username.is_empty() {
        bail!("Username and password required");
    }

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(format!("Password for {username}: "))?,
    };

    match gateway.login(&username, &password).await {
        Ok(AuthState::Authenticated) => {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                error!(error = %e, "Failed to save config");
            }
            print_status(gateway.authority());
            Ok(())
        }
        Ok(AuthState::Anonymous) => bail!("The server issued a credential this client cannot use"),
        Err(e) if e.is_unauthorized() => bail!("Invalid username or password"),
        Err(e) => Err(e.into()),
    }
}

async fn get(gateway: &ApiGateway, path: &str) -> Result<()> {
    match gateway.get::<serde_json::Value>(path).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(ApiError::Unauthorized) => bail!("Session expired. Please log in again."),
        Err(e @ ApiError::Network(_)) => {
            error!(error = %e, "Request failed");
            bail!("Network error. Check your connection.")
        }
        Err(e) => Err(e.into()),
    }
}

fn print_status(authority: &SessionAuthority) {
    let session = authority.session();
    let Some(claims) = session.claims() else {
        println!("Not signed in");
        return;
    };

    println!("{}", welcome_line(session.profile().as_ref()));
    println!("User:    {}{}", claims.username, if claims.is_admin { " (admin)" } else { "" });
    println!("Expires: {}", format_expiry(claims.expires_at));
    if let Some(remaining) = authority.seconds_remaining() {
        println!("Session: {}", format_countdown(remaining));
    }
}

async fn watch(authority: &SessionAuthority) -> Result<()> {
    let mut changes = authority.subscribe();
    let mut ticker = tokio::time::interval(WATCH_REFRESH);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(remaining) = authority.seconds_remaining() {
                    println!("Session: {}", format_countdown(remaining));
                }
            }
            changed = changes.changed() => {
                if changed.is_err() || *changes.borrow_and_update() == AuthState::Anonymous {
                    return Ok(());
                }
            }
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
