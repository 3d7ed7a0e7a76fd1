//! CLI argument definitions for Joinery.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Joinery: sign in and set up your team's query workspace.
#[derive(Parser)]
#[command(name = "joinery", version, about = "Joinery sign-in and organization setup")]
pub struct Cli {
    /// Settings file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with GitHub, or as the demo user when OAuth is unavailable.
    Login {
        /// Keep the session after this process exits.
        #[arg(long, short)]
        remember: bool,

        /// Print the authorization URL and exit instead of listening for
        /// the redirect. Finish with `joinery callback`.
        #[arg(long)]
        no_listen: bool,
    },

    /// Finish a sign-in with the code and state from the redirect URL.
    Callback {
        #[arg(long)]
        code: String,

        #[arg(long)]
        state: String,
    },

    /// Sign out and forget every stored credential.
    Logout,

    /// Show who is signed in.
    Status,

    /// Exchange the refresh token for a new access token.
    Refresh,

    /// Switch demo mode on or off.
    Demo,

    /// Stay signed in, printing session notices. Each input line counts as
    /// activity.
    Watch,

    /// Create your first organization.
    Setup,
}
