// Document assembler trait - Turns rendered panels and a template into the final report
use crate::domain::dashboard::StructuredDashboard;
use crate::domain::report::FilterVariables;
use crate::domain::timerange::TimeRange;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("failed to render report template: {0}")]
    Template(String),
    #[error("typesetter {command:?} failed: {detail}")]
    Typesetter { command: String, detail: String },
    #[error("report file {} was not produced", .0.display())]
    Missing(PathBuf),
    #[error("report file {} is empty", .0.display())]
    Empty(PathBuf),
    #[error("report file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Inputs of one report document
pub struct ReportDocument<'a> {
    pub dashboard: &'a StructuredDashboard,
    pub time_range: &'a TimeRange,
    pub template: &'a str,
    pub variables: &'a FilterVariables,
    pub panels_dir: &'a Path,
}

#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    /// Produce the report bytes; the artifact is named after the dashboard's request id
    async fn assemble(&self, document: ReportDocument<'_>) -> Result<Vec<u8>, AssemblyError>;
}
