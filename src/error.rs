use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalaxyError {
    #[error("Missing configuration: {name} ({hint})")]
    MissingCredential { name: &'static str, hint: String },

    #[error("{message}")]
    Status {
        status: StatusCode,
        url: String,
        message: String,
    },

    #[error("could not connect to {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse API JSON (url={url})")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Protocol(String),
}

impl GalaxyError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GalaxyError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GalaxyError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        GalaxyError::Transport {
            url: url.to_string(),
            source,
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct GalaxyErrorResponse {
    #[serde(default)]
    pub(crate) err_msg: Option<String>,
    #[serde(default)]
    pub(crate) err_code: Option<u64>,
    // tus endpoints and some proxies answer with {"detail": ...} or {"message": ...}
    #[serde(default)]
    pub(crate) detail: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Builds a [`GalaxyError::Status`] from a non-2xx response body.
pub(crate) fn status_error(status: StatusCode, url: &str, body: &str) -> GalaxyError {
    let parsed = serde_json::from_str::<GalaxyErrorResponse>(body).unwrap_or_default();
    let message = format_galaxy_error(status, url, &parsed, body);
    GalaxyError::Status {
        status,
        url: url.to_string(),
        message,
    }
}

pub(crate) fn format_galaxy_error(
    status: StatusCode,
    url: &str,
    e: &GalaxyErrorResponse,
    raw: &str,
) -> String {
    let msg = e
        .err_msg
        .as_deref()
        .or(e.detail.as_deref())
        .or(e.message.as_deref())
        .unwrap_or_else(|| raw.trim());
    let code = e
        .err_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "(none)".to_string());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return format!(
            "Galaxy authentication/authorization failed (HTTP {}).\n- Check that GALAXY_API_KEY (or `key:` in .galaxyrc) holds a valid API key for this server\n- API keys are shown under User > Preferences > Manage API Key\n- Make sure GALAXY_URL points at the same Galaxy instance that issued the key\n\nServer message: {}\nerr_code: {}\nrequest: {}",
            status.as_u16(),
            msg,
            code,
            url
        );
    }

    if status == StatusCode::NOT_FOUND {
        return format!(
            "Galaxy resource not found (HTTP 404).\n- The id may be wrong, or the item was deleted or purged on the server\n- Check that GALAXY_URL is the server root (e.g. https://usegalaxy.org)\n\nServer message: {}\nrequest: {}",
            msg, url
        );
    }

    format!(
        "API request failed: HTTP {} for url ({})\n{}\nerr_code: {}",
        status.as_u16(),
        url,
        msg,
        code
    )
}
