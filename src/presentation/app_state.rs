// Application state for HTTP handlers
use crate::application::report_service::ReportService;
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub report_service: ReportService,
    pub credentials_file: Option<PathBuf>,
}
