//! CLI entry point for Joinery.
//!
//! The `joinery` command signs users in and out, keeps a session alive while
//! watching for idle timeouts, and runs first-time organization setup.

mod cli;
mod helpers;
mod setup;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use joinery_auth::{
    ActivityEvent, AuthMode, AuthService, CallbackServer, LoginOutcome, NoticeLevel,
};
use joinery_onboarding::{LocalDirectory, WizardStore};
use joinery_vault::TieredStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    helpers::init_tracing(if cli.verbose { "debug" } else { "info" });

    let settings = helpers::load_settings(&cli.config)?;
    let storage = helpers::open_storage()?;
    let auth = AuthService::bootstrap(settings, storage.clone())
        .await
        .context("failed to restore session")?;

    match cli.command {
        Commands::Login {
            remember,
            no_listen,
        } => cmd_login(&auth, remember, no_listen).await,
        Commands::Callback { code, state } => cmd_callback(&auth, &code, &state).await,
        Commands::Logout => cmd_logout(&auth).await,
        Commands::Status => cmd_status(&auth, storage).await,
        Commands::Refresh => cmd_refresh(&auth).await,
        Commands::Demo => cmd_demo(&auth).await,
        Commands::Watch => cmd_watch(&auth).await,
        Commands::Setup => cmd_setup(&auth, storage).await,
    }
}

// ---------------------------------------------------------------------------
// Sign-in
// ---------------------------------------------------------------------------

async fn cmd_login(auth: &AuthService, remember: bool, no_listen: bool) -> Result<()> {
    if auth.is_authenticated() {
        println!("Already signed in as {}.", helpers::describe(&auth.snapshot()));
        return Ok(());
    }

    // Listen before handing out the URL so a fast redirect is not missed.
    let config = auth.config();
    let server = if helpers::wants_callback_listener(config, no_listen) {
        Some(
            CallbackServer::bind(&config.redirect_uri, config.callback_timeout_secs)
                .await
                .context("failed to start callback listener")?,
        )
    } else {
        None
    };

    match auth.login_with_provider(remember).await? {
        LoginOutcome::Demo(user) => {
            println!("OAuth is not configured. Signed in as demo user {}.", user.name);
        }
        LoginOutcome::Redirect(url) => {
            println!("Open this URL in your browser to sign in:\n\n  {url}\n");
            let Some(server) = server else {
                println!("Then run `joinery callback --code <code> --state <state>`.");
                return Ok(());
            };
            let params = server.wait().await?;
            let user = auth.handle_callback(&params.code, &params.state).await?;
            println!("Signed in as {} <{}>.", user.name, user.email);
            if !remember {
                println!("Session-only login: it ends when this process exits.");
            }
        }
    }
    Ok(())
}

async fn cmd_callback(auth: &AuthService, code: &str, state: &str) -> Result<()> {
    let user = auth
        .handle_callback(code, state)
        .await
        .context("sign-in failed")?;
    println!("Signed in as {} <{}>.", user.name, user.email);
    Ok(())
}

async fn cmd_logout(auth: &AuthService) -> Result<()> {
    if !auth.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }
    auth.logout().await.context("failed to clear stored session")?;
    println!("Signed out.");
    Ok(())
}

async fn cmd_demo(auth: &AuthService) -> Result<()> {
    let snapshot = auth.toggle_demo().await?;
    match snapshot.mode {
        Some(AuthMode::Demo) => println!("Demo mode on: {}.", helpers::describe(&snapshot)),
        _ => println!("Demo mode off."),
    }
    Ok(())
}

async fn cmd_refresh(auth: &AuthService) -> Result<()> {
    match auth.mode() {
        Some(AuthMode::OAuth) => {}
        Some(AuthMode::Demo) => bail!("demo sessions have no token to refresh"),
        None => bail!("not signed in"),
    }
    match auth.refresh_token().await {
        Some(_) => println!("Access token refreshed."),
        None => bail!("refresh failed, sign in again"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn cmd_status(auth: &AuthService, storage: TieredStorage) -> Result<()> {
    let snapshot = auth.snapshot();
    println!("  Session:   {}", helpers::describe(&snapshot));
    println!("  Backend:   {}", auth.config().api_base_url);
    println!(
        "  OAuth:     {}",
        if auth.config().github.is_configured() { "configured" } else { "not configured" }
    );
    println!("  Database:  {}", helpers::database_path().display());

    let wizard = WizardStore::new(storage.clone())?;
    let directory = LocalDirectory::new(storage);
    let needs_setup = wizard
        .flags()
        .needs_setup(snapshot.authenticated, &directory)
        .await?;
    if needs_setup {
        println!("\n  No organization yet. Run `joinery setup` to create one.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

async fn cmd_watch(auth: &AuthService) -> Result<()> {
    if !auth.is_authenticated() {
        bail!("not signed in");
    }
    println!("Watching {}. Press Enter to stay active, Ctrl-C to stop.", helpers::describe(&auth.snapshot()));

    let mut notices = auth.notifications();
    let mut state = auth.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let tag = match notice.level {
                        NoticeLevel::Warning => "warning",
                        NoticeLevel::Error => "error",
                        NoticeLevel::Success => "ok",
                        NoticeLevel::Info => "info",
                    };
                    println!("[{tag}] {}", notice.message);
                }
                Err(e) => warn!(error = %e, "missed session notices"),
            },
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().authenticated {
                    println!("Signed out.");
                    // Let a trailing notice print before exiting.
                    if let Ok(Ok(notice)) = tokio::time::timeout(Duration::from_millis(100), notices.recv()).await {
                        println!("[info] {}", notice.message);
                    }
                    return Ok(());
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    auth.record_activity(ActivityEvent::KeyPress);
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("watch interrupted");
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

async fn cmd_setup(auth: &AuthService, storage: TieredStorage) -> Result<()> {
    let Some(user) = auth.current_user() else {
        bail!("sign in before setting up an organization");
    };

    let wizard = WizardStore::new(storage.clone())?;
    let directory = LocalDirectory::new(storage);

    let confirmed = {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        setup::run_wizard(&wizard, &mut stdin.lock(), &mut stdout.lock())?
    };
    if !confirmed {
        return Ok(());
    }

    let org = wizard
        .complete(&directory, &user.id)
        .await
        .context("failed to create organization")?;
    println!("\n  Organization \"{}\" created successfully!", org.name);

    let next = wizard.flags().take_redirect()?;
    println!("  Continue at {next}.");
    Ok(())
}
