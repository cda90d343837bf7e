//! Argument rewriting for commands forwarded to cargo.
//!
//! Forwarded commands get `--verbose` unless the run is quiet, and on
//! nightly the configured feature is merged into (or appended as) a
//! `--features` argument. Every function here takes its input by value or
//! by reference and returns a fresh vector, so applying a rewrite twice
//! means calling it twice on purpose.
//!
//! Only the part before a `--` separator belongs to cargo, so that is the
//! part searched and extended; anything after it is left alone.

use crate::channel::Channel;

/// Outcome of rewriting one forwarded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Invoke(Vec<String>),
    /// The command is not meaningful on this channel and must not run.
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions<'a> {
    pub channel: &'a Channel,
    pub quiet: bool,
    pub inject_feature: bool,
    pub nightly_feature: &'a str,
}

pub fn rewrite(subcommand: &str, args: &[String], opts: RewriteOptions<'_>) -> Rewrite {
    if subcommand == "bench" && !opts.channel.is_nightly() {
        return Rewrite::Skip;
    }

    let mut args = args.to_vec();
    if opts.inject_feature {
        args = add_features(args, opts.channel, opts.nightly_feature);
    }
    if !opts.quiet {
        args = add_verbose(args);
    }
    Rewrite::Invoke(args)
}

/// Merges `feature` into the first `--features` argument, or appends a new
/// `--features FEATURE` pair. Only nightly with a non-empty feature touches
/// the arguments at all.
pub fn add_features(mut args: Vec<String>, channel: &Channel, feature: &str) -> Vec<String> {
    if !channel.is_nightly() || feature.is_empty() {
        return args;
    }

    let end = cargo_end(&args);
    let existing = args[..end]
        .iter()
        .position(|arg| arg == "--features" || arg.starts_with("--features="));

    match existing {
        Some(i) if args[i] == "--features" => {
            if i + 1 < end {
                args[i + 1].push(' ');
                args[i + 1].push_str(feature);
            } else {
                // bare trailing `--features`
                args.insert(end, feature.to_string());
            }
        }
        Some(i) => {
            args[i].push(' ');
            args[i].push_str(feature);
        }
        None => {
            args.insert(end, "--features".to_string());
            args.insert(end + 1, feature.to_string());
        }
    }
    args
}

pub fn add_verbose(mut args: Vec<String>) -> Vec<String> {
    let end = cargo_end(&args);
    if !args[..end].iter().any(|arg| arg == "--verbose" || arg == "-v") {
        args.insert(end, "--verbose".to_string());
    }
    args
}

/// Index of the `--` separator, or the length when there is none.
fn cargo_end(args: &[String]) -> usize {
    args.iter().position(|arg| arg == "--").unwrap_or(args.len())
}
