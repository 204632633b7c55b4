// Report errors - Everything a report request can fail with
use crate::application::document_assembler::AssemblyError;
use crate::application::panel_fetch::FetchError;
use crate::domain::layout::LayoutError;
use crate::domain::report::InvalidVariableError;
use crate::domain::timerange::BoundaryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("dashboard uid {0:?} is not valid")]
    InvalidDashboardUid(String),

    #[error(transparent)]
    InvalidTimeRange(#[from] BoundaryError),

    #[error(transparent)]
    InvalidVariable(#[from] InvalidVariableError),

    #[error("template {0:?} does not exist")]
    TemplateNotFound(String),

    #[error("could not get authorization: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("could not get Grafana dashboard: {0:#}")]
    Dashboard(anyhow::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not generate report document: {0}")]
    Assembly(#[from] AssemblyError),
}
