//! Loads the YAML config file, substitutes `${VAR}` / `${VAR:default}` placeholders
//! against the process environment, then parses and validates it (`spec.md` §6).

use crate::config::{RootConfig, RootConfigError};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("reading `{0}`: {1}")]
    Read(String, std::io::Error),
    #[error("undefined variable `${{{0}}}` with no default")]
    UndefinedVariable(String),
    #[error("parsing yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] RootConfigError),
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-?([^}]*))?\}").unwrap())
}

/// Replaces every `${VAR}` / `${VAR:default}` occurrence in `raw` using `lookup`.
/// Exposed separately from [`load`] so it can be unit tested without real env vars.
pub fn substitute(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigLoadError> {
    let re = placeholder_re();
    let mut out = String::with_capacity(raw.len());
    let mut last_end = 0;

    for caps in re.captures_iter(raw) {
        let whole = caps.get(0).unwrap();
        out.push_str(&raw[last_end..whole.start()]);
        last_end = whole.end();

        let var = &caps[1];
        let default = caps.get(3).map(|m| m.as_str());

        match lookup(var) {
            Some(value) => out.push_str(&value),
            None => match default {
                Some(default) => out.push_str(default),
                None => return Err(ConfigLoadError::UndefinedVariable(var.to_string())),
            },
        }
    }
    out.push_str(&raw[last_end..]);
    Ok(out)
}

/// Reads, substitutes, parses, and validates the config file at `path`.
pub fn load(path: &Path) -> Result<RootConfig, ConfigLoadError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| ConfigLoadError::Read(path.display().to_string(), err))?;
    let substituted = substitute(&raw, |var| std::env::var(var).ok())?;
    let config: RootConfig = serde_yaml::from_str(&substituted)?;
    config.validate()?;
    Ok(config)
}
