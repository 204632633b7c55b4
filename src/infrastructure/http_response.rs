// HTTP response utilities for report documents and report errors
use crate::application::errors::ReportError;
use crate::application::report_service::GeneratedReport;
use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use std::time::Duration;

/// Time spent producing the response, in milliseconds
pub const DURATION_HEADER: &str = "x-report-duration-ms";

pub fn pdf_response(report: GeneratedReport, elapsed: Duration) -> Result<Response<Body>, StatusCode> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", report.file_name())).map_err(|e| {
        tracing::error!("Invalid Content-Disposition for {}: {}", report.request_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, report.content.len())
        .header(DURATION_HEADER, elapsed.as_millis().to_string())
        .body(Body::from(report.content))
        .map_err(|e| {
            tracing::error!("Response build error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub fn status_for(error: &ReportError) -> StatusCode {
    match error {
        ReportError::InvalidDashboardUid(_)
        | ReportError::InvalidTimeRange(_)
        | ReportError::InvalidVariable(_) => StatusCode::BAD_REQUEST,
        ReportError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ReportError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
        ReportError::Layout(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReportError::Dashboard(_) => StatusCode::BAD_GATEWAY,
        ReportError::Fetch(_) | ReportError::Assembly(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!("Report failed: {}", self);
        } else {
            tracing::warn!("Report rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::panel_fetch::FetchError;
    use crate::domain::layout::LayoutError;
    use crate::domain::timerange::{BoundaryError, Role, TimeRangeError};

    #[test]
    fn test_pdf_response() {
        let report = GeneratedReport {
            request_id: "nodes_report_now-1h-now".to_string(),
            content: b"%PDF-1.5".to_vec(),
        };
        let response = pdf_response(report, Duration::from_millis(1500)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"nodes_report_now-1h-now.pdf\""
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "8");
        assert_eq!(headers[DURATION_HEADER], "1500");
    }

    #[test]
    fn test_error_status() {
        let cases = [
            (ReportError::InvalidDashboardUid("../x".to_string()), StatusCode::BAD_REQUEST),
            (
                ReportError::InvalidTimeRange(BoundaryError {
                    role: Role::From,
                    source: TimeRangeError::InvalidExpression("yesterday".to_string()),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (ReportError::Unauthorized("none".to_string()), StatusCode::UNAUTHORIZED),
            (ReportError::TemplateNotFound("x".to_string()), StatusCode::NOT_FOUND),
            (
                ReportError::Layout(LayoutError::CapacityExceeded {
                    rows: 501,
                    rows_limit: 500,
                    panels: 501,
                    panels_limit: 1000,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ReportError::Dashboard(anyhow::anyhow!("refused")), StatusCode::BAD_GATEWAY),
            (
                ReportError::Fetch(FetchError::Task("panicked".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
