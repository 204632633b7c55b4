// Report service - Use case for generating dashboard reports
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::document_assembler::{DocumentAssembler, ReportDocument};
use crate::application::errors::ReportError;
use crate::application::panel_fetch::{discard_panel_images, PanelFetchOrchestrator};
use crate::application::template_registry::TemplateRegistry;
use crate::domain::dashboard::StructuredDashboard;
use crate::domain::report::{correlation_id, is_safe_dashboard_uid, FilterVariables};
use crate::domain::timerange::TimeRange;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Values used when a request leaves a parameter out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDefaults {
    pub template: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub defaults: ReportDefaults,
    pub render_collapsed: bool,
    pub save_temp_images: bool,
}

/// Parameters of one report; `None` falls back to the configured defaults
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub dashboard_uid: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub template: Option<String>,
    pub render_collapsed: Option<bool>,
    pub variables: FilterVariables,
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub request_id: String,
    pub content: Vec<u8>,
}

impl GeneratedReport {
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.request_id)
    }
}

#[derive(Clone)]
pub struct ReportService {
    repository: Arc<dyn DashboardRepository>,
    orchestrator: PanelFetchOrchestrator,
    assembler: Arc<dyn DocumentAssembler>,
    templates: Arc<TemplateRegistry>,
    options: ReportOptions,
}

impl ReportService {
    pub fn new(
        repository: Arc<dyn DashboardRepository>,
        orchestrator: PanelFetchOrchestrator,
        assembler: Arc<dyn DocumentAssembler>,
        templates: Arc<TemplateRegistry>,
        options: ReportOptions,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            assembler,
            templates,
            options,
        }
    }

    pub fn defaults(&self) -> &ReportDefaults {
        &self.options.defaults
    }

    pub fn list_template_names(&self) -> Vec<String> {
        self.templates.names()
    }

    pub fn get_template(&self, name: &str) -> Result<&str, ReportError> {
        self.templates
            .get(name)
            .ok_or_else(|| ReportError::TemplateNotFound(name.to_string()))
    }

    pub async fn generate_report(
        &self,
        request: ReportRequest,
        auth_header: &str,
    ) -> Result<GeneratedReport, ReportError> {
        self.generate_report_at(Utc::now(), request, auth_header).await
    }

    /// Generate a report with relative time expressions resolved against `now`.
    ///
    /// Input errors are reported before Grafana is contacted. Panel images are
    /// removed afterwards unless `save_temp_images` is set, whatever the outcome.
    pub async fn generate_report_at(
        &self,
        now: DateTime<Utc>,
        request: ReportRequest,
        auth_header: &str,
    ) -> Result<GeneratedReport, ReportError> {
        let started = Instant::now();
        let uid = request.dashboard_uid;
        if !is_safe_dashboard_uid(&uid) {
            return Err(ReportError::InvalidDashboardUid(uid));
        }

        let defaults = &self.options.defaults;
        let template_name = request.template.unwrap_or_else(|| defaults.template.clone());
        let template = self.get_template(&template_name)?;

        let from = request.from.unwrap_or_else(|| defaults.from.clone());
        let to = request.to.unwrap_or_else(|| defaults.to.clone());
        let time_range = TimeRange::resolve(now, &from, &to)?;

        let render_collapsed = request.render_collapsed.unwrap_or(self.options.render_collapsed);
        let request_id = correlation_id(&uid, &time_range.from, &time_range.to, render_collapsed);
        tracing::info!(
            "Generating report {:?} with parameters: dashboardId={}, from={}, to={}, template={}, vars={}",
            request_id,
            uid,
            time_range.from,
            time_range.to,
            template_name,
            request.variables.encode()
        );

        let entity = self
            .repository
            .get_dashboard(&uid, auth_header)
            .await
            .map_err(ReportError::Dashboard)?;
        let dashboard = StructuredDashboard::from_entity(entity, render_collapsed)?.with_request_id(&request_id);
        tracing::debug!(
            "Dashboard {} has {} rows and {} panels to render",
            uid,
            dashboard.rows.len(),
            dashboard.panel_count()
        );

        let outcome = match self
            .orchestrator
            .fetch(&dashboard, &time_range, &request.variables, auth_header)
            .await
        {
            Ok(panels_dir) => self
                .assembler
                .assemble(ReportDocument {
                    dashboard: &dashboard,
                    time_range: &time_range,
                    template,
                    variables: &request.variables,
                    panels_dir: &panels_dir,
                })
                .await
                .map_err(ReportError::from),
            Err(err) => Err(ReportError::from(err)),
        };

        if !self.options.save_temp_images {
            discard_panel_images(&self.orchestrator.settings().panels_dir(&request_id)).await;
        }

        let content = outcome?;
        tracing::info!(
            "Report {} generated in {:?} ({} bytes)",
            request_id,
            started.elapsed(),
            content.len()
        );
        Ok(GeneratedReport {
            request_id,
            content,
        })
    }
}
