use anyhow::{Context as _, Result};
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::channel::{resolve_channel, Channel};
use crate::config::CiEnv;
use crate::logging;
use crate::process::{Runner, SystemRunner};
use crate::registry::{self, CommandKind, Context, Outcome};

#[derive(Debug, Parser)]
#[command(name = "travis-cargo")]
#[command(about = "Manages interactions between CI services and Cargo, and common tooling tasks")]
#[command(version)]
pub struct Cli {
    /// Don't pass --verbose to cargo subcommands
    #[arg(short, long)]
    pub quiet: bool,

    /// Only run the given command if the specified channel matches `TRAVIS_RUST_VERSION`
    #[arg(long, value_name = "CHANNEL")]
    pub only: Option<String>,

    /// Only run the given command if the specified channel does not match `TRAVIS_RUST_VERSION`
    #[arg(long, value_name = "CHANNEL")]
    pub skip: Option<String>,

    #[command(subcommand)]
    pub command: Invocation,
}

/// Every command name is accepted here; the registry decides what it means.
/// Arguments after the name are kept verbatim, `--` included.
#[derive(Debug, Subcommand)]
pub enum Invocation {
    #[command(external_subcommand)]
    External(Vec<String>),
}

impl Cli {
    pub fn command_name(&self) -> &str {
        match &self.command {
            Invocation::External(argv) => argv.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn command_args(&self) -> &[String] {
        match &self.command {
            Invocation::External(argv) => argv.get(1..).unwrap_or_default(),
        }
    }
}

pub fn run_cli() -> Result<Outcome> {
    let matches = Cli::command()
        .after_help(registry::help_text())
        .get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let env = CiEnv::from_process();
    logging::init(&env);

    let project_dir = std::env::current_dir()
        .context("Failed to determine the current directory")?;

    dispatch(&cli, &env, &SystemRunner, project_dir)
}

/// Resolves the channel, applies `--only`/`--skip`, then hands the command
/// to its registered handler.
pub fn dispatch(
    cli: &Cli,
    env: &CiEnv,
    runner: &dyn Runner,
    project_dir: PathBuf,
) -> Result<Outcome> {
    let channel = resolve_channel(env, runner)?;

    if let Some(ref only) = cli.only {
        if Channel::from(only.as_str()) != channel {
            info!(%channel, only = %only, "not running on this channel");
            return Ok(Outcome::Gated);
        }
    }
    if let Some(ref skip) = cli.skip {
        if Channel::from(skip.as_str()) == channel {
            info!(%channel, "skipped on this channel");
            return Ok(Outcome::Gated);
        }
    }

    let ctx = Context::new(channel, cli.quiet, env, runner, project_dir);

    let name = cli.command_name();
    let args = cli.command_args();

    match registry::kind_of(name) {
        CommandKind::Forward { inject_feature } => {
            registry::run_forwarded(&ctx, name, args, inject_feature)
        }
        CommandKind::Special { schema, handler } => {
            let argv = std::iter::once(name).chain(args.iter().map(String::as_str));
            let matches = schema().get_matches_from(argv);
            handler(&ctx, &matches)?;
            Ok(Outcome::Ran)
        }
    }
}
