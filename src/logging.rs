use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{CiEnv, LOG_VAR};

const DEFAULT_FILTER: &str = "warn";

/// Diagnostics go to stderr so they never mix with the output of the
/// commands we run. `TRAVIS_CARGO_LOG` takes the usual filter directives.
pub fn init(env: &CiEnv) {
    let filter = env
        .var(LOG_VAR)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}
