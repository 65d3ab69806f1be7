//! Service configuration.
//!
//! Everything arrives through the environment: credentials for the three
//! external collaborators plus the state directory holding the ledger and
//! attachment scratch space.

use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret every intake request must present.
    pub shared_secret: String,
    /// Account owning the generated repositories; also the Pages host.
    pub github_username: String,
    pub github_token: String,
    pub openrouter_api_key: String,
    /// Durable idempotency ledger location.
    pub ledger_path: PathBuf,
    /// Scratch directory for decoded attachments.
    pub attachments_dir: PathBuf,
    pub bind: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables. Missing credentials
    /// are a startup error; paths and the bind address have defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let shared_secret = require("USER_SECRET")?;
        let github_username = require("GITHUB_USERNAME")?;
        let github_token = require("GITHUB_TOKEN")?;
        let openrouter_api_key = require("OPENROUTER_API_KEY")?;

        let state_dir = match env::var("PAGESMITH_STATE_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_state_dir(),
        };

        let bind = match env::var("PAGESMITH_BIND") {
            Ok(addr) if !addr.is_empty() => addr
                .parse()
                .with_context(|| format!("PAGESMITH_BIND is not a socket address: {}", addr))?,
            _ => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        };

        Ok(Self {
            shared_secret,
            github_username,
            github_token,
            openrouter_api_key,
            ledger_path: state_dir.join("ledger.json"),
            attachments_dir: state_dir.join("attachments"),
            bind,
        })
    }
}

fn require(name: &str) -> anyhow::Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!("{} must be set", name)),
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("pagesmith"))
        .unwrap_or_else(|| env::temp_dir().join("pagesmith"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global, so everything lives in one test.
    #[test]
    fn test_from_env_reads_and_defaults() {
        let saved: Vec<(&str, Option<String>)> = [
            "USER_SECRET",
            "GITHUB_USERNAME",
            "GITHUB_TOKEN",
            "OPENROUTER_API_KEY",
            "PAGESMITH_STATE_DIR",
            "PAGESMITH_BIND",
        ]
        .into_iter()
        .map(|name| (name, env::var(name).ok()))
        .collect();

        env::remove_var("USER_SECRET");
        assert!(Config::from_env().is_err());

        env::set_var("USER_SECRET", "s3cret");
        env::set_var("GITHUB_USERNAME", "octocat");
        env::set_var("GITHUB_TOKEN", "ghp_xxx");
        env::set_var("OPENROUTER_API_KEY", "sk-or-xxx");
        env::set_var("PAGESMITH_STATE_DIR", "/tmp/pagesmith-test");
        env::set_var("PAGESMITH_BIND", "127.0.0.1:9999");

        let config = Config::from_env().unwrap();
        assert_eq!(config.shared_secret, "s3cret");
        assert_eq!(config.ledger_path, PathBuf::from("/tmp/pagesmith-test/ledger.json"));
        assert_eq!(
            config.attachments_dir,
            PathBuf::from("/tmp/pagesmith-test/attachments")
        );
        assert_eq!(config.bind.port(), 9999);

        env::set_var("PAGESMITH_BIND", "not-an-address");
        assert!(Config::from_env().is_err());

        for (name, value) in saved {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}
