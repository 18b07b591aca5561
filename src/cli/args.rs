use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "gitward",
    version,
    about = "Authenticated ref discovery for git remotes, with guided credential recovery"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for verbose, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode: suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the refs a fetch from the remote would see
    Fetch(OpArgs),

    /// List the refs a pull from the remote would see
    Pull(OpArgs),

    /// List the refs a push to the remote would update
    Push(OpArgs),

    /// Manage stored credentials
    Credentials(CredentialsArgs),

    /// Manage remembered host answers (host keys)
    Trust(TrustArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments shared by `fetch`, `pull` and `push`.
#[derive(clap::Args, Debug)]
pub struct OpArgs {
    /// Remote URL (https://, ssh://, user@host:path) or configured remote name
    pub remote: String,

    /// Repository used to resolve remote names
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Never prompt; decline every dialog
    #[arg(long)]
    pub non_interactive: bool,

    /// Maximum attempts, including the first (overrides config.toml)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,
}

/// Arguments for `gitward credentials`.
#[derive(clap::Args, Debug)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub action: Option<CredentialsAction>,
}

#[derive(Subcommand, Debug)]
pub enum CredentialsAction {
    /// List hosts with stored credentials
    List,
    /// Store credentials for a host (the secret is read without echo)
    Set(CredentialsSetArgs),
    /// Remove the credentials stored for a host
    Rm(CredentialsRmArgs),
}

#[derive(clap::Args, Debug)]
pub struct CredentialsSetArgs {
    /// Host name (e.g., github.com)
    pub host: String,

    /// Username for password-based credentials
    #[arg(long, conflicts_with = "token", required_unless_present = "token")]
    pub username: Option<String>,

    /// Store an access token instead of a username and password
    #[arg(long)]
    pub token: bool,
}

#[derive(clap::Args, Debug)]
pub struct CredentialsRmArgs {
    /// Host name to remove
    pub host: String,
}

/// Arguments for `gitward trust`.
#[derive(clap::Args, Debug)]
pub struct TrustArgs {
    #[command(subcommand)]
    pub action: Option<TrustAction>,
}

#[derive(Subcommand, Debug)]
pub enum TrustAction {
    /// List remembered answers
    List,
    /// Forget every remembered answer
    Reset,
}

/// Arguments for the `gitward completions` command.
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
