use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod authenticator;
mod classify;
mod cli;
mod config;
mod credentials;
mod error;
mod interact;
mod prompt;
mod protocol;
mod retry;
mod secret;
mod transport;
mod worker;

use authenticator::Authenticator;
use cli::args::{
    Cli, Commands, CredentialsAction, CredentialsArgs, CredentialsSetArgs, OpArgs, TrustAction,
    TrustArgs,
};
use config::paths::gitward_config_dir;
use config::types::{GitwardConfig, Verbosity};
use credentials::{
    CredentialRecord, CredentialStore, FileCredentialStore, GitCredentialHelper,
    NoPlatformCredentials, PlatformCredentials,
};
use error::GitwardError;
use interact::{bridge, Interaction, TerminalInteraction};
use prompt::{AnswerStore, PromptAnswerCache};
use secret::SecretBuffer;
use transport::TransportOptions;
use worker::{Action, Job};

fn main() {
    let cli = Cli::parse();

    // Convert CLI flags to verbosity level
    let verbosity = Verbosity::from((cli.quiet, cli.verbose));

    // RUST_LOG env var overrides CLI flags
    let filter = verbosity.as_tracing_filter();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr) // Keep stdout clean for ref listings
        .init();

    tracing::debug!("Verbosity level: {:?}", verbosity);

    if let Err(err) = run(cli) {
        display_error(&err);
        std::process::exit(1);
    }
}

/// Execute the dispatched command.
fn run(cli: Cli) -> Result<(), GitwardError> {
    match cli.command {
        Commands::Fetch(args) => run_remote(Action::Fetch, args),
        Commands::Pull(args) => run_remote(Action::Pull, args),
        Commands::Push(args) => run_remote(Action::Push, args),
        Commands::Credentials(args) => run_credentials(args),
        Commands::Trust(args) => run_trust(args),
        Commands::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "gitward",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// Run a remote action on the worker thread while this thread answers its
/// dialogs on the terminal.
fn run_remote(action: Action, args: OpArgs) -> Result<(), GitwardError> {
    let config_dir = gitward_config_dir()?;
    let config = GitwardConfig::load(&config_dir)?;

    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::load(&config_dir)?);
    let fallback: Arc<dyn PlatformCredentials> = if config.use_git_credential_helper {
        Arc::new(GitCredentialHelper::new())
    } else {
        Arc::new(NoPlatformCredentials)
    };
    let answers = if config.remember_host_answers {
        PromptAnswerCache::with_store(AnswerStore::load(&config_dir)?)
    } else {
        PromptAnswerCache::new()
    };

    let (bridge, foreground) = bridge::channel();
    let interaction: Arc<dyn Interaction> = Arc::new(bridge);
    let authenticator = Authenticator::new(
        Arc::clone(&store),
        fallback,
        answers,
        Arc::clone(&interaction),
    );

    let job = Job {
        action,
        remote: args.remote,
        repo_dir: args.repo.clone(),
        max_attempts: args.max_attempts.unwrap_or(config.max_attempts),
        options: TransportOptions {
            timeout: config.timeout(),
            identity_files: config.identity_files.clone(),
        },
    };
    tracing::debug!(%action, remote = %job.remote, max_attempts = job.max_attempts, "Starting");
    let handle = worker::spawn(job, authenticator, interaction)?;

    let mut ui = TerminalInteraction::new(args.repo, args.non_interactive);
    if config.remember_credentials {
        ui = ui.remember_credentials(store);
    }
    let dialogs = foreground.serve(&ui);
    tracing::debug!(dialogs, "Worker finished");

    for remote_ref in worker::join(handle)? {
        println!("{}\t{}", remote_ref.oid, remote_ref.name);
    }
    Ok(())
}

fn run_credentials(args: CredentialsArgs) -> Result<(), GitwardError> {
    let config_dir = gitward_config_dir()?;
    let store = FileCredentialStore::load(&config_dir)?;

    match args.action.unwrap_or(CredentialsAction::List) {
        CredentialsAction::List => {
            let hosts = store.hosts();
            if hosts.is_empty() {
                eprintln!("No stored credentials.");
            }
            for (host, kind) in hosts {
                println!("{}\t{}", host, kind.as_str());
            }
        }
        CredentialsAction::Set(set) => {
            let record = read_credentials(&set)?;
            store.put(&set.host, &record)?;
            eprintln!("Stored {} credentials for {}", record.kind().as_str(), set.host);
        }
        CredentialsAction::Rm(rm) => {
            if !store.remove(&rm.host)? {
                return Err(GitwardError::CredentialStore(format!(
                    "no credentials stored for '{}'",
                    rm.host
                )));
            }
            eprintln!("Removed credentials for {}", rm.host);
        }
    }
    Ok(())
}

/// Read the secret for `credentials set` from the terminal without echo.
fn read_credentials(args: &CredentialsSetArgs) -> Result<CredentialRecord, GitwardError> {
    let prompt = match &args.username {
        Some(username) => format!("Password for {}@{}: ", username, args.host),
        None => format!("Token for {}: ", args.host),
    };
    let secret = SecretBuffer::from_string(rpassword::prompt_password(prompt)?);
    if !secret.is_usable() {
        return Err(GitwardError::CredentialStore("empty secret; nothing stored".into()));
    }
    Ok(match &args.username {
        Some(username) => CredentialRecord::password(username.clone(), secret),
        None => CredentialRecord::token(secret),
    })
}

fn run_trust(args: TrustArgs) -> Result<(), GitwardError> {
    let config_dir = gitward_config_dir()?;
    let mut store = AnswerStore::load(&config_dir)?;

    match args.action.unwrap_or(TrustAction::List) {
        TrustAction::List => {
            let answers = store.list();
            if answers.is_empty() {
                eprintln!("No remembered answers.");
            }
            for (host, text, stored) in answers {
                println!(
                    "{}\t{}\t{}\t{}",
                    host,
                    if stored.answer { "yes" } else { "no" },
                    stored.answered_at.format("%Y-%m-%d %H:%M:%S"),
                    text.replace('\n', " ")
                );
            }
        }
        TrustAction::Reset => {
            let removed = store.clear();
            store.save()?;
            eprintln!("Forgot {} remembered answer(s)", removed);
        }
    }
    Ok(())
}

/// Display a GitwardError with optional suggestion hint to stderr.
fn display_error(err: &GitwardError) {
    eprintln!("error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {}", suggestion);
    }
}
