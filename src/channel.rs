use std::fmt;

use tracing::debug;

use crate::config::CiEnv;
use crate::error::Result;
use crate::process::{CommandLine, Runner};

/// Toolchain release track. Identifiers we don't recognise are kept
/// verbatim and only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Stable,
    Beta,
    Nightly,
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Nightly => "nightly",
            Channel::Other(name) => name,
        }
    }

    pub fn is_nightly(&self) -> bool {
        matches!(self, Channel::Nightly)
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        match name {
            "stable" => Channel::Stable,
            "beta" => Channel::Beta,
            "nightly" => Channel::Nightly,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first marker found wins.
const VERSION_MARKERS: &[(&str, Channel)] = &[
    ("nightly", Channel::Nightly),
    ("dev", Channel::Nightly),
    ("beta", Channel::Beta),
];

/// Classifies `rustc -V` output. Anything without a known marker is a
/// release build, i.e. stable.
pub fn classify_version(output: &str) -> Channel {
    VERSION_MARKERS
        .iter()
        .find(|(marker, _)| output.contains(marker))
        .map(|(_, channel)| channel.clone())
        .unwrap_or(Channel::Stable)
}

pub fn resolve_channel(env: &CiEnv, runner: &dyn Runner) -> Result<Channel> {
    if let Some(name) = env.channel_override() {
        debug!(channel = name, "channel taken from environment");
        return Ok(Channel::from(name));
    }

    let output = runner.run_output(&CommandLine::new("rustc").arg("-V"))?;
    let channel = classify_version(&output);
    debug!(%channel, version = output.trim(), "channel detected from rustc");
    Ok(channel)
}
