//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use skadi_core::models::Role;

#[derive(Parser, Debug)]
#[command(
    name = "skadi",
    version,
    about = "Command-line client for the skadi school management backend",
    after_help = "Environment: SKADI_API_BASE_URL, SKADI_TIMEOUT_SECS, SKADI_REFRESH_PATH, SKADI_LOG_DIR, RUST_LOG"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in (the password is prompted)
    Login {
        #[arg(long)]
        username: Option<String>,

        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Sign out
    Logout {
        /// Also drop the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show the signed-in user
    #[command(name = "whoami")]
    WhoAmI,
    /// List personal-area tabs for your role
    Tabs,
    /// Member administration (admin only)
    Members {
        #[command(subcommand)]
        command: MembersCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MembersCommand {
    /// List members, optionally filtered
    List {
        /// Case-insensitive match on username or full name
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        role: Option<Role>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one or more members
    Show {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Create a teacher or student (the password is prompted)
    Create(NewMember),
    /// Delete a member
    Delete { id: i64 },
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct NewMember {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub fullname: String,

    /// teacher or student (default: student)
    #[arg(long)]
    pub role: Option<Role>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub parent_email: Option<String>,

    #[arg(long)]
    pub parent_phone: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// Admin-only notes
    #[arg(long)]
    pub extra: Option<String>,

    #[arg(long)]
    pub class_id: Option<i64>,
}
