// Repository trait for Grafana access
use crate::domain::dashboard::DashboardEntity;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Base URL of the Grafana instance, used to compose render URLs
    fn endpoint(&self) -> &str;

    /// Fetch the dashboard JSON model by uid
    async fn get_dashboard(&self, uid: &str, auth_header: &str) -> anyhow::Result<DashboardEntity>;

    /// Fetch one rendered panel image from a fully composed render URL
    async fn render_panel(&self, url: &str, auth_header: &str) -> anyhow::Result<Bytes>;
}
