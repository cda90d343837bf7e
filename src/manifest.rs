use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::{Captured, CommandLine, Runner};

/// Package description as printed by `cargo read-manifest`.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    targets: Vec<Target>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub kind: Vec<String>,
    #[serde(default)]
    pub metadata: TargetMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetMetadata {
    #[serde(default)]
    pub extra_filename: String,
}

impl Target {
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kind.iter().any(|k| k == kind)
    }

    pub fn normalized_name(&self) -> String {
        self.name.replace('-', "_")
    }

    /// File name of the compiled test binary for this target.
    pub fn binary_name(&self) -> String {
        format!("{}{}", self.normalized_name(), self.metadata.extra_filename)
    }
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the manifest of the package in `dir`.
    ///
    /// Older cargo wanted `--manifest-path` to name the directory, newer
    /// cargo wants the `Cargo.toml` itself, so both are tried in that order.
    pub fn load(runner: &dyn Runner, dir: &Path) -> Result<Self> {
        let path_file = dir.join("Cargo.toml");
        let attempts = [path_file.as_path(), dir];

        let mut failures: Vec<(&Path, Captured)> = Vec::new();
        for path in attempts {
            let cmd = CommandLine::new("cargo")
                .arg("read-manifest")
                .arg("--manifest-path")
                .arg(path.display().to_string());
            let captured = runner.capture(&cmd)?;
            if captured.success() {
                debug!(manifest_path = %path.display(), "read manifest");
                return Self::from_json(&captured.stdout);
            }
            failures.push((path, captured));
        }

        let paths: Vec<String> = failures
            .iter()
            .map(|(path, _)| format!("`--manifest-path {}`", path.display()))
            .collect();
        eprintln!("Cargo failed to read {}:", paths.join(" and "));
        for (_, captured) in &failures {
            eprintln!("{}{}", captured.stdout, captured.stderr);
        }

        let code = failures.last().map(|(_, c)| c.code).unwrap_or(1);
        Err(Error::ToolFailed {
            program: "cargo".to_string(),
            code,
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Normalized name of the first library target, if there is one.
    pub fn lib_name(&self) -> Option<String> {
        self.targets
            .iter()
            .find(|target| target.has_kind("lib"))
            .map(Target::normalized_name)
    }
}
