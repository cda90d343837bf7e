use anyhow::{Context as _, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TOKEN_VAR;
use crate::error::Error;
use crate::process::CommandLine;
use crate::registry::Context;

const GHP_IMPORT_REPO: &str = "https://github.com/davisp/ghp-import";
const PAGES_BRANCH: &str = "gh-pages";

#[derive(Debug, Parser)]
#[command(
    name = "doc-upload",
    about = "Upload documentation to GitHub Pages",
    long_about = "Use ghp-import to upload cargo-rendered docs to GitHub Pages, \
                  from the master branch. Nothing is uploaded for pull requests."
)]
pub struct DocUploadArgs {
    /// Upload docs when on this branch
    #[arg(long, default_value = "master")]
    pub branch: String,
}

pub fn schema() -> clap::Command {
    DocUploadArgs::command()
}

pub fn doc_upload(ctx: &Context<'_>, matches: &ArgMatches) -> Result<()> {
    let args = DocUploadArgs::from_arg_matches(matches)?;
    publish(ctx, &args)
}

pub fn publish(ctx: &Context<'_>, args: &DocUploadArgs) -> Result<()> {
    let branch = ctx.env.branch()?;
    let repo = ctx.env.repo_slug()?;
    let pull_request = ctx.env.is_pull_request();

    let lib_name = ctx
        .manifest()?
        .lib_name()
        .ok_or(Error::MissingLibraryTarget)?;

    if branch != args.branch || pull_request {
        println!(
            "not uploading docs: on branch `{}` (uploads happen from `{}`){}",
            branch,
            args.branch,
            if pull_request { " in a pull request" } else { "" }
        );
        return Ok(());
    }

    // Secure variables aren't decrypted for pull requests, so the token is
    // only looked up once we know we are uploading.
    let token = ctx.env.require(TOKEN_VAR)?;

    println!("uploading docs...");
    std::io::stdout().flush().ok();

    let doc_dir = ctx.project_dir.join("target").join("doc");
    write_redirect(&doc_dir, &lib_name)?;

    let runner = ctx.runner;
    runner.run(
        &CommandLine::new("git")
            .args(["clone", GHP_IMPORT_REPO])
            .current_dir(&ctx.project_dir),
    )?;
    runner.run(
        &CommandLine::new(python_interpreter())
            .args(["./ghp-import/ghp-import", "-n", "target/doc"])
            .current_dir(&ctx.project_dir),
    )?;

    let remote = format!("https://{}@github.com/{}.git", token, repo);
    runner.run_filtered(
        &CommandLine::new("git")
            .args(["push", "-fq"])
            .arg(remote)
            .arg(PAGES_BRANCH)
            .current_dir(&ctx.project_dir),
        token,
    )?;

    info!(repo, "docs uploaded");
    Ok(())
}

/// Writes an `index.html` that forwards to the crate's own docs.
pub fn write_redirect(doc_dir: &Path, lib_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(doc_dir)
        .with_context(|| format!("Failed to create doc directory: {}", doc_dir.display()))?;

    let index = doc_dir.join("index.html");
    fs::write(
        &index,
        format!("<meta http-equiv=refresh content=0;url={}/index.html>", lib_name),
    )
    .with_context(|| format!("Failed to write redirect to {}", index.display()))?;

    Ok(index)
}

fn python_interpreter() -> String {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "python3".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::config::CiEnv;
    use crate::process::testing::ScriptedRunner;

    const LIB_MANIFEST: &str = r#"{"targets": [{"kind": ["lib"], "name": "my-crate"}]}"#;

    fn args(branch: &str) -> DocUploadArgs {
        DocUploadArgs {
            branch: branch.to_string(),
        }
    }

    #[test]
    fn test_default_branch() {
        let matches = schema().get_matches_from(["doc-upload"]);
        let parsed = DocUploadArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(parsed.branch, "master");
    }

    #[test]
    fn test_write_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let doc_dir = dir.path().join("target").join("doc");
        let index = write_redirect(&doc_dir, "my_crate").unwrap();
        assert_eq!(
            fs::read_to_string(index).unwrap(),
            "<meta http-equiv=refresh content=0;url=my_crate/index.html>"
        );
    }

    #[test]
    fn test_uploads_from_matching_branch() {
        let dir = tempfile::tempdir().unwrap();
        let env = CiEnv::from_pairs([
            ("TRAVIS_BRANCH", "master"),
            ("TRAVIS_REPO_SLUG", "owner/repo"),
            ("TRAVIS_PULL_REQUEST", "false"),
            ("GH_TOKEN", "s3cret"),
        ]);
        let runner = ScriptedRunner::new().reply(0, LIB_MANIFEST);
        let ctx = Context::new(Channel::Stable, false, &env, &runner, dir.path().to_path_buf());

        publish(&ctx, &args("master")).unwrap();

        let calls = runner.rendered();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].starts_with("cargo read-manifest"));
        assert_eq!(calls[1], format!("git clone {}", GHP_IMPORT_REPO));
        assert!(calls[2].ends_with("./ghp-import/ghp-import -n target/doc"));
        assert_eq!(
            calls[3],
            "git push -fq https://s3cret@github.com/owner/repo.git gh-pages"
        );

        let index = dir.path().join("target/doc/index.html");
        assert!(fs::read_to_string(index).unwrap().contains("url=my_crate/index.html"));
    }

    #[test]
    fn test_pull_request_uploads_nothing_and_needs_no_token() {
        let env = CiEnv::from_pairs([
            ("TRAVIS_BRANCH", "master"),
            ("TRAVIS_REPO_SLUG", "owner/repo"),
            ("TRAVIS_PULL_REQUEST", "12"),
        ]);
        let runner = ScriptedRunner::new().reply(0, LIB_MANIFEST);
        let ctx = Context::new(Channel::Stable, false, &env, &runner, PathBuf::from("/p"));

        publish(&ctx, &args("master")).unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_other_branch_uploads_nothing() {
        let env = CiEnv::from_pairs([("TRAVIS_BRANCH", "feature"), ("TRAVIS_REPO_SLUG", "o/r")]);
        let runner = ScriptedRunner::new().reply(0, LIB_MANIFEST);
        let ctx = Context::new(Channel::Stable, false, &env, &runner, PathBuf::from("/p"));

        publish(&ctx, &args("master")).unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_missing_library_is_fatal() {
        let env = CiEnv::from_pairs([("TRAVIS_BRANCH", "master"), ("TRAVIS_REPO_SLUG", "o/r")]);
        let runner =
            ScriptedRunner::new().reply(0, r#"{"targets": [{"kind": ["bin"], "name": "tool"}]}"#);
        let ctx = Context::new(Channel::Stable, false, &env, &runner, PathBuf::from("/p"));

        let err = publish(&ctx, &args("master")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingLibraryTarget)
        ));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_missing_branch_fails_before_any_command() {
        let env = CiEnv::default();
        let runner = ScriptedRunner::new();
        let ctx = Context::new(Channel::Stable, false, &env, &runner, PathBuf::from("/p"));

        let err = publish(&ctx, &args("master")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingEnvironment(name)) if name == "TRAVIS_BRANCH"
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_missing_token_on_upload() {
        let dir = tempfile::tempdir().unwrap();
        let env = CiEnv::from_pairs([("TRAVIS_BRANCH", "master"), ("TRAVIS_REPO_SLUG", "o/r")]);
        let runner = ScriptedRunner::new().reply(0, LIB_MANIFEST);
        let ctx = Context::new(Channel::Stable, false, &env, &runner, dir.path().to_path_buf());

        let err = publish(&ctx, &args("master")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingEnvironment(name)) if name == "GH_TOKEN"
        ));
    }
}
