// Grafana credentials - Authorization header resolution
use crate::application::errors::ReportError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "apiKey", alias = "apikey")]
    pub api_key: String,
}

impl Credentials {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// An API key wins over user and password
    pub fn auth_header(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(format!("Bearer {}", self.api_key));
        }
        if !self.user.is_empty() && !self.password.is_empty() {
            let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
            return Some(format!("Basic {}", token));
        }
        None
    }
}

/// Use the caller's Authorization header when present, otherwise the credentials file.
pub async fn resolve_auth_header(
    request_header: Option<&str>,
    credentials_file: Option<&Path>,
) -> Result<String, ReportError> {
    if let Some(header) = request_header.map(str::trim).filter(|h| !h.is_empty()) {
        return Ok(header.to_string());
    }

    let path = credentials_file
        .ok_or_else(|| ReportError::Unauthorized("credentials are not provided".to_string()))?;
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ReportError::Unauthorized(format!("could not read credentials file {}: {}", path.display(), e))
    })?;
    let credentials = Credentials::parse(&content).map_err(|e| {
        ReportError::Unauthorized(format!("could not parse credentials file {}: {:#}", path.display(), e))
    })?;

    credentials
        .auth_header()
        .ok_or_else(|| ReportError::Unauthorized("credentials are not provided".to_string()))
}
