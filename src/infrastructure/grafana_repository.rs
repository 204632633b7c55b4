// Grafana repository implementation
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::DashboardEntity;
use crate::infrastructure::config::GrafanaSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};

#[derive(Debug, Clone)]
pub struct GrafanaRepository {
    endpoint: String,
    client: reqwest::Client,
}

impl GrafanaRepository {
    pub fn new(settings: &GrafanaSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(settings.insecure_skip_verify);

        if let Some(ca_file) = &settings.ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("Failed to read CA file {}", ca_file.display()))?;
            let certificate = reqwest::Certificate::from_pem(&pem).context("Failed to parse CA certificate")?;
            builder = builder.add_root_certificate(certificate);
        }

        if let (Some(cert_file), Some(key_file)) = (&settings.cert_file, &settings.key_file) {
            let cert = std::fs::read(cert_file)
                .with_context(|| format!("Failed to read client certificate {}", cert_file.display()))?;
            let key = std::fs::read(key_file)
                .with_context(|| format!("Failed to read client key {}", key_file.display()))?;
            let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key).context("Failed to load client identity")?;
            builder = builder.identity(identity);
        }

        let client = builder.build().context("Failed to build Grafana HTTP client")?;
        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn dashboard_url(&self, uid: &str) -> String {
        format!("{}/api/dashboards/uid/{}", self.endpoint, urlencoding::encode(uid))
    }
}

#[async_trait]
impl DashboardRepository for GrafanaRepository {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_dashboard(&self, uid: &str, auth_header: &str) -> Result<DashboardEntity> {
        let url = self.dashboard_url(uid);
        tracing::debug!("Fetching dashboard model from {}", url);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, auth_header)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .context("Failed to send request to Grafana")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Grafana dashboard request failed with status {}: {}", status, body);
        }

        response
            .json::<DashboardEntity>()
            .await
            .context("Failed to parse Grafana dashboard response")
    }

    async fn render_panel(&self, url: &str, auth_header: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, auth_header)
            .send()
            .await
            .context("Failed to send render request to Grafana")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Grafana panel render failed with status {}: {}", status, body);
        }

        // A login page answered with 200 is still a failure
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.is_empty() && !content_type.starts_with("image/") {
            anyhow::bail!("Grafana panel render returned {} instead of an image", content_type);
        }

        response.bytes().await.context("Failed to read rendered panel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };

    async fn dashboard(Path(uid): Path<String>, headers: HeaderMap) -> impl IntoResponse {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer t") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({
            "dashboard": {
                "uid": uid,
                "title": "Nodes",
                "panels": [
                    {"id": 1, "type": "timeseries", "gridPos": {"x": 0, "y": 0, "w": 12, "h": 8}},
                    {"id": 2, "type": "row", "title": "Disks", "collapsed": true, "gridPos": {"x": 0, "y": 8, "w": 24, "h": 1},
                     "panels": [{"id": 3, "type": "stat", "gridPos": {"x": 0, "y": 9, "w": 6, "h": 4}}]}
                ]
            },
            "meta": {"slug": "nodes"}
        }))
        .into_response()
    }

    async fn render(Path((_uid, slug)): Path<(String, String)>) -> impl IntoResponse {
        if slug == "login" {
            return ([("content-type", "text/html")], "<html>login</html>").into_response();
        }
        ([("content-type", "image/png")], &b"\x89PNG"[..]).into_response()
    }

    async fn spawn_grafana() -> String {
        let router = Router::new()
            .route("/api/dashboards/uid/:uid", get(dashboard))
            .route("/render/d-solo/:uid/:slug", get(render));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn repository(endpoint: &str) -> GrafanaRepository {
        GrafanaRepository::new(&GrafanaSettings {
            endpoint: format!("{}/", endpoint),
            credentials_file: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_dashboard() {
        let endpoint = spawn_grafana().await;
        let repository = repository(&endpoint);
        assert_eq!(repository.endpoint(), endpoint);

        let entity = repository.get_dashboard("abc", "Bearer t").await.unwrap();
        assert_eq!(entity.dashboard.uid, "abc");
        assert_eq!(entity.meta.slug, "nodes");
        assert_eq!(entity.dashboard.panels.len(), 2);
        assert!(entity.dashboard.panels[1].is_row());
        assert_eq!(entity.dashboard.panels[1].panels[0].id, 3);
    }

    #[tokio::test]
    async fn test_get_dashboard_rejected() {
        let endpoint = spawn_grafana().await;
        let err = repository(&endpoint).get_dashboard("abc", "Bearer wrong").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_render_panel() {
        let endpoint = spawn_grafana().await;
        let repository = repository(&endpoint);

        let image = repository
            .render_panel(&format!("{}/render/d-solo/abc/nodes?panelId=1", endpoint), "Bearer t")
            .await
            .unwrap();
        assert_eq!(&image[..], b"\x89PNG");

        let err = repository
            .render_panel(&format!("{}/render/d-solo/abc/login?panelId=1", endpoint), "Bearer t")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("text/html"));
    }
}
