use std::collections::HashMap;

use crate::error::{Error, Result};

pub const RUST_VERSION_VAR: &str = "TRAVIS_RUST_VERSION";
pub const NIGHTLY_FEATURE_VAR: &str = "TRAVIS_CARGO_NIGHTLY_FEATURE";
pub const LOG_VAR: &str = "TRAVIS_CARGO_LOG";
pub const TOKEN_VAR: &str = "GH_TOKEN";
pub const JOB_ID_VAR: &str = "TRAVIS_JOB_ID";

pub const BRANCH_VARS: [&str; 2] = ["APPVEYOR_REPO_BRANCH", "TRAVIS_BRANCH"];
pub const REPO_VARS: [&str; 2] = ["APPVEYOR_REPO_NAME", "TRAVIS_REPO_SLUG"];
pub const APPVEYOR_PR_VAR: &str = "APPVEYOR_PULL_REQUEST_NUMBER";
pub const TRAVIS_PR_VAR: &str = "TRAVIS_PULL_REQUEST";

pub const DEFAULT_NIGHTLY_FEATURE: &str = "unstable";

/// Immutable snapshot of the environment a run was started with.
///
/// Handlers only ever look variables up here, never in the live process
/// environment, so tests can build one from literal pairs.
#[derive(Debug, Clone, Default)]
pub struct CiEnv {
    vars: HashMap<String, String>,
}

impl CiEnv {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.var(name)
            .ok_or_else(|| Error::MissingEnvironment(name.to_string()))
    }

    /// First non-empty variable out of `names`; the error names the last
    /// one, which is the conventional fallback.
    pub fn require_any(&self, names: &[&str]) -> Result<&str> {
        names
            .iter()
            .find_map(|name| self.var(name).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                Error::MissingEnvironment(names.last().copied().unwrap_or_default().to_string())
            })
    }

    pub fn channel_override(&self) -> Option<&str> {
        self.var(RUST_VERSION_VAR)
    }

    /// Feature injected on nightly. May legitimately be empty, which turns
    /// injection off.
    pub fn nightly_feature(&self) -> &str {
        self.var(NIGHTLY_FEATURE_VAR)
            .unwrap_or(DEFAULT_NIGHTLY_FEATURE)
    }

    pub fn branch(&self) -> Result<&str> {
        self.require_any(&BRANCH_VARS)
    }

    pub fn repo_slug(&self) -> Result<&str> {
        self.require_any(&REPO_VARS)
    }

    pub fn is_pull_request(&self) -> bool {
        if self.var(APPVEYOR_PR_VAR).is_some_and(|v| !v.is_empty()) {
            return true;
        }
        self.var(TRAVIS_PR_VAR).unwrap_or("false") != "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nightly_feature_default_and_empty() {
        let env = CiEnv::default();
        assert_eq!(env.nightly_feature(), "unstable");

        let env = CiEnv::from_pairs([(NIGHTLY_FEATURE_VAR, "")]);
        assert_eq!(env.nightly_feature(), "");

        let env = CiEnv::from_pairs([(NIGHTLY_FEATURE_VAR, "nightly-extras")]);
        assert_eq!(env.nightly_feature(), "nightly-extras");
    }

    #[test]
    fn test_appveyor_takes_precedence() {
        let env = CiEnv::from_pairs([
            ("APPVEYOR_REPO_BRANCH", "dev"),
            ("TRAVIS_BRANCH", "master"),
        ]);
        assert_eq!(env.branch().unwrap(), "dev");

        let env = CiEnv::from_pairs([("TRAVIS_BRANCH", "master")]);
        assert_eq!(env.branch().unwrap(), "master");
    }

    #[test]
    fn test_missing_variable_names_fallback() {
        let env = CiEnv::default();
        match env.repo_slug() {
            Err(Error::MissingEnvironment(name)) => assert_eq!(name, "TRAVIS_REPO_SLUG"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            env.require(TOKEN_VAR),
            Err(Error::MissingEnvironment(_))
        ));
    }

    #[test]
    fn test_pull_request_detection() {
        assert!(!CiEnv::default().is_pull_request());
        assert!(!CiEnv::from_pairs([(TRAVIS_PR_VAR, "false")]).is_pull_request());
        assert!(CiEnv::from_pairs([(TRAVIS_PR_VAR, "42")]).is_pull_request());
        assert!(CiEnv::from_pairs([(APPVEYOR_PR_VAR, "7")]).is_pull_request());
        assert!(!CiEnv::from_pairs([(APPVEYOR_PR_VAR, "")]).is_pull_request());
    }
}
