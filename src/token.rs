//! API token discovery.
//!
//! The token is a secret: it is never logged or printed, only its source.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable checked first
pub const ENV_TOKEN: &str = "TODOIST_API_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Env,
    File,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Env => write!(f, "{ENV_TOKEN}"),
            TokenSource::File => write!(f, "token file"),
        }
    }
}

#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: String,
}

/// Fallback token file: `~/.config/todoist/config.json` holding
/// `{"token": "..."}`
pub fn token_file_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("todoist").join("config.json"))
}

/// Find the API token in the environment, else in the token file
pub fn discover() -> Result<(String, TokenSource)> {
    let env = std::env::var(ENV_TOKEN).ok();
    resolve(env.as_deref(), &token_file_path()?)
}

fn resolve(env: Option<&str>, file: &Path) -> Result<(String, TokenSource)> {
    if let Some(token) = env.map(str::trim).filter(|t| !t.is_empty()) {
        log::debug!("using API token from {}", TokenSource::Env);
        return Ok((token.to_string(), TokenSource::Env));
    }

    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => bail!(
            "{ENV_TOKEN} not set and token file not found at {}",
            file.display()
        ),
        Err(err) => {
            return Err(err).with_context(|| format!("Could not read token file {}", file.display()));
        }
    };
    let parsed: TokenFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid token file {}", file.display()))?;
    let token = parsed.token.trim();
    if token.is_empty() {
        bail!("token file {} missing required key \"token\"", file.display());
    }
    log::debug!("using API token from {}", file.display());
    Ok((token.to_string(), TokenSource::File))
}
