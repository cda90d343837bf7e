//! Code coverage of `cargo test` through kcov.
//!
//! Test binaries are found from cargo's JSON build messages, each one is run
//! under kcov into its own `target/kcov-NAME` directory, and the results are
//! merged in a final kcov call (which also uploads when a coveralls job id
//! is given). Doc tests are not covered.

use anyhow::{Context as _, Result};
use cargo_metadata::Message;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::JOB_ID_VAR;
use crate::process::CommandLine;
use crate::registry::Context;
use crate::rewrite;

const KCOV_ARCHIVE: &str = "https://github.com/SimonKagstrom/kcov/archive/master.zip";
const KCOV_DEPS: &str = "sudo apt-get install -y libcurl4-openssl-dev libelf-dev libdw-dev cmake";
const DEFAULT_MERGE_DIR: &str = "target/kcov";

#[derive(Debug, Clone, Copy, Args)]
pub struct KcovArgs {
    /// Don't use `sudo` to install kcov's build dependencies. Requires that
    /// libcurl4-openssl-dev, libelf-dev and libdw-dev are already installed
    #[arg(long)]
    pub no_sudo: bool,

    /// Pass `--verify` to kcov, to avoid some crashes. Requires the
    /// `binutils-dev` package
    #[arg(long)]
    pub verify: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "coverage",
    about = "Record code coverage",
    long_about = "Record coverage of `cargo test`, this runs all binaries that `cargo test` \
                  runs but not doc tests. The results of all tests are merged into a single \
                  directory."
)]
pub struct CoverageArgs {
    /// The directory to put the final merged kcov result into
    #[arg(short = 'm', long, value_name = "DIR", default_value = DEFAULT_MERGE_DIR)]
    pub merge_into: PathBuf,

    #[command(flatten)]
    pub kcov: KcovArgs,

    /// Arguments to pass to `cargo test`
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub cargo_args: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(
    name = "coveralls",
    about = "Record and upload code coverage to coveralls.io",
    long_about = "Record coverage of `cargo test` and upload to coveralls.io with kcov, this \
                  runs all binaries that `cargo test` runs but not doc tests. Merged kcov \
                  results can be accessed in `target/kcov`."
)]
pub struct CoverallsArgs {
    #[command(flatten)]
    pub kcov: KcovArgs,

    /// Arguments to pass to `cargo test`
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub cargo_args: Vec<String>,
}

pub fn coverage_schema() -> clap::Command {
    CoverageArgs::command()
}

pub fn coveralls_schema() -> clap::Command {
    CoverallsArgs::command()
}

pub fn coverage(ctx: &Context<'_>, matches: &ArgMatches) -> Result<()> {
    let args = CoverageArgs::from_arg_matches(matches)?;
    let kcov = locate_kcov(ctx, args.kcov)?;
    let merge = Merge {
        message: "Merging coverage",
        extra_args: Vec::new(),
        dir: args.merge_into,
    };
    record_coverage(ctx, &kcov, args.kcov.verify, args.cargo_args, &merge)
}

pub fn coveralls(ctx: &Context<'_>, matches: &ArgMatches) -> Result<()> {
    let args = CoverallsArgs::from_arg_matches(matches)?;
    let job_id = ctx.env.require(JOB_ID_VAR)?;
    let kcov = locate_kcov(ctx, args.kcov)?;
    let merge = Merge {
        message: "Uploading coverage",
        extra_args: vec![format!("--coveralls-id={}", job_id)],
        dir: PathBuf::from(DEFAULT_MERGE_DIR),
    };
    record_coverage(ctx, &kcov, args.kcov.verify, args.cargo_args, &merge)
}

/// Final kcov step that folds all per-binary results together.
#[derive(Debug, Clone)]
pub struct Merge {
    pub message: &'static str,
    pub extra_args: Vec<String>,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBinary {
    pub name: String,
    pub path: PathBuf,
}

impl TestBinary {
    fn output_dir(&self) -> String {
        format!("target/kcov-{}", self.name)
    }
}

pub fn record_coverage(
    ctx: &Context<'_>,
    kcov: &Path,
    verify: bool,
    test_args: Vec<String>,
    merge: &Merge,
) -> Result<()> {
    let test_args = rewrite::add_features(test_args, &ctx.channel, ctx.env.nightly_feature());
    let binaries = find_test_binaries(ctx, &test_args)?;
    let kcov = kcov.display().to_string();

    for binary in &binaries {
        println!("Recording {}", binary.name);
        let mut cmd = CommandLine::new(&kcov);
        if verify {
            cmd = cmd.arg("--verify");
        }
        cmd = cmd
            .arg("--exclude-pattern=/.cargo")
            .arg(binary.output_dir())
            .arg(binary.path.display().to_string())
            .current_dir(&ctx.project_dir);
        ctx.runner.run(&cmd)?;
    }

    println!("{}", merge.message);
    let cmd = CommandLine::new(&kcov)
        .arg("--merge")
        .args(merge.extra_args.iter().cloned())
        .arg(merge.dir.display().to_string())
        .args(binaries.iter().map(TestBinary::output_dir))
        .current_dir(&ctx.project_dir);
    ctx.runner.run(&cmd)?;

    info!(binaries = binaries.len(), merged_into = %merge.dir.display(), "coverage recorded");
    Ok(())
}

/// Builds the tests without running them and collects every test executable
/// cargo reports.
pub fn find_test_binaries(ctx: &Context<'_>, test_args: &[String]) -> Result<Vec<TestBinary>> {
    let cmd = CommandLine::new("cargo")
        .args(["test", "--no-run", "--message-format=json"])
        .args(test_args.iter().cloned())
        .current_dir(&ctx.project_dir);
    let output = ctx.runner.run_output(&cmd)?;
    Ok(parse_test_binaries(&output))
}

pub fn parse_test_binaries(output: &str) -> Vec<TestBinary> {
    let mut binaries = Vec::new();

    for message in Message::parse_stream(output.as_bytes()) {
        match message {
            Ok(Message::CompilerArtifact(artifact)) if artifact.profile.test => {
                if let Some(executable) = artifact.executable {
                    let name = executable
                        .file_name()
                        .unwrap_or(artifact.target.name.as_str())
                        .to_string();
                    binaries.push(TestBinary {
                        name,
                        path: executable.into_std_path_buf(),
                    });
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "unreadable cargo message"),
        }
    }

    binaries
}

/// Uses a `kcov` already on `PATH`, or builds one from source.
pub fn locate_kcov(ctx: &Context<'_>, opts: KcovArgs) -> Result<PathBuf> {
    match which::which("kcov") {
        Ok(path) => {
            info!(kcov = %path.display(), "using installed kcov");
            Ok(path)
        }
        Err(_) => build_kcov(ctx, opts),
    }
}

pub fn build_kcov(ctx: &Context<'_>, opts: KcovArgs) -> Result<PathBuf> {
    let mut setup = Vec::new();
    if !opts.no_sudo {
        let mut deps = KCOV_DEPS.to_string();
        if opts.verify {
            deps.push_str(" binutils-dev");
        }
        setup.push(deps);
    }
    setup.push(format!("wget {}", KCOV_ARCHIVE));
    setup.push("unzip master.zip".to_string());
    setup.push("mv kcov-master kcov".to_string());
    setup.push("mkdir kcov/build".to_string());

    run_lines(ctx, &setup, &ctx.project_dir)?;

    let build_dir = ctx.project_dir.join("kcov").join("build");
    run_lines(ctx, &["cmake ..", "make"], &build_dir).context("Failed to build kcov")?;

    Ok(build_dir.join("src").join("kcov"))
}

fn run_lines<S: AsRef<str>>(ctx: &Context<'_>, lines: &[S], dir: &Path) -> Result<()> {
    for line in lines {
        let line = line.as_ref().trim();
        if let Some(cmd) = CommandLine::from_line(line) {
            println!("Running: {}", line);
            ctx.runner.run(&cmd.current_dir(dir))?;
        }
    }
    Ok(())
}
