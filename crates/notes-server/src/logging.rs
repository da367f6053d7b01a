//! Tracing subscriber setup.
//!
//! `local` logs human-readable text at debug, `dev` logs JSON at debug and
//! `prod` logs JSON at info. `RUST_LOG` overrides the default level.

use crate::config::Env;
use tracing_subscriber::EnvFilter;

/// Default filter directive for an environment
pub fn default_level(env: Env) -> &'static str {
    match env {
        Env::Local | Env::Dev => "debug",
        Env::Prod => "info",
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if a global subscriber is already installed
pub fn init(env: Env) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(env)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match env {
        Env::Local => builder.pretty().try_init(),
        Env::Dev | Env::Prod => builder.json().try_init(),
    };

    result.map_err(|e| e.to_string())
}
