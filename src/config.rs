use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::GalaxyError;

pub const URL_VAR: &str = "GALAXY_URL";
pub const KEY_VAR: &str = "GALAXY_API_KEY";
pub const VERIFY_VAR: &str = "GALAXY_VERIFY";
pub const RC_VAR: &str = "GALAXY_RC";

const DEFAULT_ENV_FILE: &str = ".env";

/// Connection parameters for one run. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    url: String,
    key: String,
    verify: bool,
}

impl ConnectionConfig {
    /// Fails with [`GalaxyError::MissingCredential`] if either value is blank.
    pub fn new(
        url: impl Into<String>,
        key: impl Into<String>,
        verify: bool,
    ) -> Result<Self, GalaxyError> {
        let url = url.into();
        let key = key.into();
        if url.trim().is_empty() {
            return Err(missing("url", URL_VAR, "--url", &[]));
        }
        if key.trim().is_empty() {
            return Err(missing("api key", KEY_VAR, "--ask-api-key", &[]));
        }
        Ok(Self {
            url: url.trim().to_string(),
            key: key.trim().to_string(),
            verify,
        })
    }

    /// Galaxy server root, e.g. `https://usegalaxy.org`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether to verify TLS certificates.
    pub fn verify(&self) -> bool {
        self.verify
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("verify", &self.verify)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
}

/// Every place a credential can come from, gathered before any precedence is applied.
#[derive(Debug, Default, Clone)]
pub struct CredentialSources {
    prompted_key: Option<String>,
    url_flag: Option<String>,
    insecure: bool,
    env: HashMap<String, String>,
    env_file: HashMap<String, String>,
    rc: RcConfig,
    rc_candidates: Vec<PathBuf>,
}

impl CredentialSources {
    /// Reads the process environment, the dotenv file and the first existing rc file.
    ///
    /// `envfile` defaults to `.env`; a missing default file is ignored, while a
    /// missing file that was named explicitly is an error.
    pub fn gather(envfile: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| matches!(k.as_str(), URL_VAR | KEY_VAR | VERIFY_VAR | RC_VAR))
            .collect();

        let env_file = match envfile {
            Some(path) => {
                if !path.exists() {
                    bail!("environment file {} does not exist", path.display());
                }
                read_env_file(path)?
            }
            None => {
                let path = Path::new(DEFAULT_ENV_FILE);
                if path.exists() {
                    read_env_file(path)?
                } else {
                    HashMap::new()
                }
            }
        };

        let explicit_rc = env
            .get(RC_VAR)
            .or_else(|| env_file.get(RC_VAR))
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let rc_candidates = rc_candidates(explicit_rc);

        let mut rc = RcConfig::default();
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                rc = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                log::debug!("Loaded configuration file {}", rc_path.display());
                break;
            }
        }

        Ok(Self {
            env,
            env_file,
            rc,
            rc_candidates,
            ..Self::default()
        })
    }

    /// Overrides the server URL from an explicit `--url` flag.
    pub fn with_url_flag(mut self, url: Option<String>) -> Self {
        self.url_flag = url;
        self
    }

    /// Overrides the API key with one typed at an interactive prompt.
    pub fn with_prompted_key(mut self, key: Option<String>) -> Self {
        self.prompted_key = key;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Applies precedence: prompt / flag, then process environment, then the
    /// env file, then the rc file.
    pub fn resolve(self) -> Result<ConnectionConfig, GalaxyError> {
        let url = pick(
            "url",
            [
                ("--url", self.url_flag.clone()),
                ("environment", self.env.get(URL_VAR).cloned()),
                ("env file", self.env_file.get(URL_VAR).cloned()),
                ("rc file", self.rc.url.clone()),
            ],
        )
        .ok_or_else(|| missing("url", URL_VAR, "--url", &self.rc_candidates))?;

        let key = pick(
            "api key",
            [
                ("prompt", self.prompted_key.clone()),
                ("environment", self.env.get(KEY_VAR).cloned()),
                ("env file", self.env_file.get(KEY_VAR).cloned()),
                ("rc file", self.rc.key.clone()),
            ],
        )
        .ok_or_else(|| missing("api key", KEY_VAR, "--ask-api-key", &self.rc_candidates))?;

        let verify = if self.insecure {
            false
        } else {
            self.env
                .get(VERIFY_VAR)
                .or_else(|| self.env_file.get(VERIFY_VAR))
                .and_then(|v| parse_flag(v))
                .or(self.rc.verify)
                .unwrap_or(true)
        };

        ConnectionConfig::new(url, key, verify)
    }
}

fn pick<const N: usize>(what: &str, sources: [(&str, Option<String>); N]) -> Option<String> {
    for (source, value) in sources {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            log::debug!("Using {} from {}", what, source);
            return Some(v);
        }
    }
    None
}

fn missing(name: &'static str, var: &str, flag: &str, rc_candidates: &[PathBuf]) -> GalaxyError {
    let hint = if rc_candidates.is_empty() {
        format!("set {var}, pass {flag}, or create .galaxyrc")
    } else {
        format!(
            "set {var}, pass {flag}, or put it in one of: {}",
            rc_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    GalaxyError::MissingCredential { name, hint }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let parsed = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read env file {}", path.display()))?;
    let mut out = HashMap::new();
    for item in parsed {
        let (key, value) =
            item.with_context(|| format!("failed to parse env file {}", path.display()))?;
        out.insert(key, value);
    }
    log::debug!("Loaded {} variable(s) from {}", out.len(), path.display());
    Ok(out)
}

pub(crate) fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `key:` may be on one line with the token on the next.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            // Continuation value line (no colon)
            if !line.contains(':') {
                let v = strip_quotes(line);
                match pk {
                    "url" => cfg.url = Some(v.to_string()),
                    "key" => cfg.key = Some(v.to_string()),
                    _ => {}
                }
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let v = strip_quotes(v.trim());
            match k.trim() {
                "url" => {
                    if !v.is_empty() {
                        cfg.url = Some(v.to_string());
                    } else {
                        pending_key = Some("url");
                    }
                }
                "key" => {
                    if !v.is_empty() {
                        cfg.key = Some(v.to_string());
                    } else {
                        pending_key = Some("key");
                    }
                }
                "verify" => cfg.verify = parse_flag(v),
                _ => {}
            }
        }
    }

    cfg
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates(explicit: Option<PathBuf>) -> Vec<PathBuf> {
    // 1) GALAXY_RC  2) ./.galaxyrc  3) ~/.galaxyrc
    if let Some(p) = explicit {
        return vec![p];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".galaxyrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".galaxyrc"));
    }
    v
}
