use anyhow::Result;
use clap::ArgMatches;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::channel::Channel;
use crate::config::CiEnv;
use crate::coverage;
use crate::docs;
use crate::manifest::Manifest;
use crate::process::{CommandLine, Runner};
use crate::rewrite::{self, Rewrite, RewriteOptions};

/// Everything a handler gets to see about the current run.
pub struct Context<'a> {
    pub channel: Channel,
    pub quiet: bool,
    pub env: &'a CiEnv,
    pub runner: &'a dyn Runner,
    pub project_dir: PathBuf,
    manifest: OnceCell<Manifest>,
}

impl<'a> Context<'a> {
    pub fn new(
        channel: Channel,
        quiet: bool,
        env: &'a CiEnv,
        runner: &'a dyn Runner,
        project_dir: PathBuf,
    ) -> Self {
        Self {
            channel,
            quiet,
            env,
            runner,
            project_dir,
            manifest: OnceCell::new(),
        }
    }

    /// The project manifest, read on first use and kept for the rest of
    /// the run.
    pub fn manifest(&self) -> crate::error::Result<&Manifest> {
        self.manifest
            .get_or_try_init(|| Manifest::load(self.runner, &self.project_dir))
    }

    pub fn rewrite_options(&self, inject_feature: bool) -> RewriteOptions<'_> {
        RewriteOptions {
            channel: &self.channel,
            quiet: self.quiet,
            inject_feature,
            nightly_feature: self.env.nightly_feature(),
        }
    }
}

pub type Handler = fn(&Context<'_>, &ArgMatches) -> Result<()>;

#[derive(Clone, Copy)]
pub enum CommandKind {
    /// Passed to `cargo <name>` after rewriting.
    Forward { inject_feature: bool },
    /// A workflow of our own with its own argument schema.
    Special {
        schema: fn() -> clap::Command,
        handler: Handler,
    },
}

pub struct SubcommandSpec {
    pub name: &'static str,
    pub description: String,
    pub kind: CommandKind,
}

impl SubcommandSpec {
    fn forward(name: &'static str, inject_feature: bool) -> Self {
        Self {
            name,
            description: format!("Run `cargo {}`", name),
            kind: CommandKind::Forward { inject_feature },
        }
    }

    fn special(
        name: &'static str,
        description: &str,
        schema: fn() -> clap::Command,
        handler: Handler,
    ) -> Self {
        Self {
            name,
            description: description.to_string(),
            kind: CommandKind::Special { schema, handler },
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self.kind, CommandKind::Forward { .. })
    }
}

/// Cargo commands that don't take `--features`.
pub const NO_FEATURE_CARGO: &[&str] = &[
    "clean",
    "fetch",
    "generate-lockfile",
    "git-checkout",
    "help",
    "init",
    "locate-project",
    "login",
    "logout",
    "metadata",
    "new",
    "owner",
    "package",
    "pkgid",
    "publish",
    "read-manifest",
    "search",
    "tree",
    "update",
    "vendor",
    "verify-project",
    "version",
    "yank",
];

/// Cargo commands that build code and so accept `--features`.
pub const FEATURE_CARGO: &[&str] = &[
    "bench", "build", "check", "clippy", "doc", "fix", "install", "run", "rustc", "rustdoc",
    "test",
];

/// Policy for names that aren't in the table.
pub const UNKNOWN_COMMAND: CommandKind = CommandKind::Forward {
    inject_feature: false,
};

static REGISTRY: Lazy<BTreeMap<&'static str, SubcommandSpec>> = Lazy::new(|| {
    let mut table = BTreeMap::new();

    for spec in [
        SubcommandSpec::special(
            "doc-upload",
            "Use ghp-import to upload cargo-rendered docs to GitHub Pages, from the master branch",
            docs::schema,
            docs::doc_upload,
        ),
        SubcommandSpec::special(
            "coverage",
            "Record coverage of `cargo test` with kcov, merging the results into one directory",
            coverage::coverage_schema,
            coverage::coverage,
        ),
        SubcommandSpec::special(
            "coveralls",
            "Record coverage of `cargo test` and upload it to coveralls.io with kcov",
            coverage::coveralls_schema,
            coverage::coveralls,
        ),
    ] {
        table.insert(spec.name, spec);
    }

    for &name in NO_FEATURE_CARGO {
        table.insert(name, SubcommandSpec::forward(name, false));
    }
    for &name in FEATURE_CARGO {
        table.insert(name, SubcommandSpec::forward(name, true));
    }

    table
});

pub fn lookup(name: &str) -> Option<&'static SubcommandSpec> {
    REGISTRY.get(name)
}

pub fn kind_of(name: &str) -> CommandKind {
    match lookup(name) {
        Some(spec) => spec.kind,
        None => {
            debug!(command = name, "not in the registry, forwarding to cargo");
            UNKNOWN_COMMAND
        }
    }
}

pub fn commands() -> impl Iterator<Item = &'static SubcommandSpec> {
    REGISTRY.values()
}

/// Command overview appended to `--help`.
pub fn help_text() -> String {
    let mut text = String::from("Special commands:\n");
    for spec in commands().filter(|spec| !spec.is_forward()) {
        text.push_str(&format!("  {:<12} {}\n", spec.name, spec.description));
    }

    let forwarded: Vec<&str> = commands()
        .filter(|spec| spec.is_forward())
        .map(|spec| spec.name)
        .collect();
    text.push_str(&format!(
        "\nAll other commands are passed to cargo, e.g. {}.\n\
         Cargo commands get `--verbose` unless `--quiet` is given and, on nightly, \
         `--features unstable` (or `--features $TRAVIS_CARGO_NIGHTLY_FEATURE`) \
         when the command accepts features.\n",
        forwarded.join(", ")
    ));
    text
}

/// What happened to a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ran,
    /// `--only`/`--skip` ruled the whole run out.
    Gated,
    /// The command doesn't apply to this channel.
    Skipped,
}

pub fn run_forwarded(
    ctx: &Context<'_>,
    name: &str,
    args: &[String],
    inject_feature: bool,
) -> Result<Outcome> {
    match rewrite::rewrite(name, args, ctx.rewrite_options(inject_feature)) {
        Rewrite::Skip => {
            println!("skipping `cargo {}` on non-nightly version", name);
            Ok(Outcome::Skipped)
        }
        Rewrite::Invoke(args) => {
            ctx.runner.run(&CommandLine::new("cargo").arg(name).args(args))?;
            Ok(Outcome::Ran)
        }
    }
}
