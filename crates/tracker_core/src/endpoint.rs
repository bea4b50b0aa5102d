use url::Url;

/// Origin used when no backend base is configured.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid backend base uri {uri}: {reason}")]
    Invalid { uri: String, reason: String },
    #[error("unsupported scheme {0}, expected http or https")]
    UnsupportedScheme(String),
}

/// Trims whitespace and trailing slashes from a user-supplied base.
pub fn normalize_base_uri(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Resolved base every API path is joined onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    base: String,
}

impl ApiBase {
    /// An empty `configured` value means "same origin", i.e. `origin`.
    pub fn resolve(configured: Option<&str>, origin: &str) -> Result<Self, EndpointError> {
        let configured = configured.map(normalize_base_uri).unwrap_or_default();
        let base = if configured.is_empty() {
            normalize_base_uri(origin)
        } else {
            configured
        };

        let parsed = Url::parse(&base).map_err(|err| EndpointError::Invalid {
            uri: base.clone(),
            reason: err.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self { base }),
            other => Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Joins an absolute API path such as `/start`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}
