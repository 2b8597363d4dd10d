use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default service endpoint, same value as the upstream `cdsapi` package.
pub const DEFAULT_URL: &str = "https://cds.climate.copernicus.eu/api/v2";

/// Resolved credentials for the CDS endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub key: String,
}

impl Credentials {
    /// Resolve credentials the way the upstream client does.
    ///
    /// Precedence: explicit values > `CDSAPI_URL` / `CDSAPI_KEY` environment
    /// variables > the rc file (`$CDSAPI_RC`, else `~/.cdsapirc`). A missing
    /// key is an error; a missing url falls back to [`DEFAULT_URL`].
    pub fn resolve(url: Option<&str>, key: Option<&str>) -> Result<Self> {
        Self::resolve_from(
            url,
            key,
            non_empty_env("CDSAPI_URL").as_deref(),
            non_empty_env("CDSAPI_KEY").as_deref(),
            rc_file_path().as_deref(),
        )
    }

    /// Resolution over explicit inputs; [`Credentials::resolve`] feeds it the
    /// process environment and rc path.
    fn resolve_from(
        explicit_url: Option<&str>,
        explicit_key: Option<&str>,
        env_url: Option<&str>,
        env_key: Option<&str>,
        rc_path: Option<&Path>,
    ) -> Result<Self> {
        let mut url = explicit_url.or(env_url).map(|s| s.to_string());
        let mut key = explicit_key.or(env_key).map(|s| s.to_string());

        if url.is_none() || key.is_none() {
            if let Some(rc) = rc_path.filter(|p| p.exists()) {
                let (rc_url, rc_key) = parse_rc_file(rc)?;
                url = url.or(rc_url);
                key = key.or(rc_key);
            }
        }

        let key = key.ok_or(Error::MissingCredentials)?;
        Ok(Self {
            url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            key,
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `$CDSAPI_RC` if set, else `$HOME/.cdsapirc`.
fn rc_file_path() -> Option<PathBuf> {
    if let Some(rc) = non_empty_env("CDSAPI_RC") {
        return Some(PathBuf::from(rc));
    }
    dirs::home_dir().map(|h| h.join(".cdsapirc"))
}

/// Parse a `.cdsapirc` file: `key: value` lines, `#` comments, blank lines
/// ignored. Unknown keys are skipped rather than rejected.
pub fn parse_rc_file(path: &Path) -> Result<(Option<String>, Option<String>)> {
    let body = fs::read_to_string(path)?;
    let mut url = None;
    let mut key = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::InvalidRequest(format!(
                "malformed line in {}: {line}",
                path.display()
            )));
        };
        let value = value.trim();
        match name.trim() {
            "url" => url = Some(value.to_string()),
            // The key itself may contain a colon (uid:secret), hence the
            // single split above.
            "key" => key = Some(value.to_string()),
            _ => {}
        }
    }

    Ok((url, key))
}
