// HTTP request handlers
use crate::application::errors::ReportError;
use crate::application::report_service::{GeneratedReport, ReportDefaults, ReportRequest};
use crate::domain::report::{FilterVariables, VARIABLE_PREFIX};
use crate::infrastructure::credentials::resolve_auth_header;
use crate::infrastructure::http_response::pdf_response;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Generate a PDF report for a dashboard.
///
/// Query parameters: `from`, `to`, `template`, `renderCollapsed` and any number of `var-*`.
pub async fn generate_report(
    Path(uid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let started = Instant::now();
    match build_report(&uid, params, &headers, &state).await {
        Ok(report) => match pdf_response(report, started.elapsed()) {
            Ok(response) => response,
            Err(status) => status.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

async fn build_report(
    uid: &str,
    params: Vec<(String, String)>,
    headers: &HeaderMap,
    state: &AppState,
) -> Result<GeneratedReport, ReportError> {
    let auth_header = resolve_auth_header(
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        state.credentials_file.as_deref(),
    )
    .await?;

    let request = report_request(uid, params)?;
    state.report_service.generate_report(request, &auth_header).await
}

/// Map raw query pairs onto a report request; the first occurrence of a named parameter wins
pub fn report_request(uid: &str, params: Vec<(String, String)>) -> Result<ReportRequest, ReportError> {
    let mut request = ReportRequest {
        dashboard_uid: uid.to_string(),
        ..Default::default()
    };
    let mut variables = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "from" => {
                request.from.get_or_insert(value);
            }
            "to" => {
                request.to.get_or_insert(value);
            }
            "template" => {
                request.template.get_or_insert(value);
            }
            "renderCollapsed" => {
                if request.render_collapsed.is_none() {
                    request.render_collapsed = parse_bool(&value);
                }
            }
            _ if key.starts_with(VARIABLE_PREFIX) => variables.push((key, value)),
            _ => {}
        }
    }

    request.variables = FilterVariables::from_pairs(variables)?;
    Ok(request)
}

/// Accepts 1, t, true, 0, f, false in any case; anything else means "use the default"
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// List report template names
pub async fn list_templates(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.report_service.list_template_names())
}

/// Template content keyed by its name
pub async fn get_template(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, String>>, ReportError> {
    let content = state.report_service.get_template(&name)?.to_string();
    Ok(Json(BTreeMap::from([(name, content)])))
}

pub async fn get_defaults(State(state): State<Arc<AppState>>) -> Json<ReportDefaults> {
    Json(state.report_service.defaults().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dashboard_repository::DashboardRepository;
    use crate::application::document_assembler::{AssemblyError, DocumentAssembler, ReportDocument};
    use crate::application::panel_fetch::{FetchSettings, PanelFetchOrchestrator};
    use crate::application::report_service::{ReportOptions, ReportService};
    use crate::application::template_registry::TemplateRegistry;
    use crate::domain::dashboard::{DashboardEntity, DashboardMeta, DashboardModel, GridPos, Panel};
    use async_trait::async_trait;
    use axum::http::{header, HeaderValue, StatusCode};
    use bytes::Bytes;

    struct StubGrafana;

    #[async_trait]
    impl DashboardRepository for StubGrafana {
        fn endpoint(&self) -> &str {
            "http://grafana:3000"
        }

        async fn get_dashboard(&self, uid: &str, auth_header: &str) -> anyhow::Result<DashboardEntity> {
            anyhow::ensure!(auth_header == "Bearer t", "status code is 401");
            Ok(DashboardEntity {
                dashboard: DashboardModel {
                    uid: uid.to_string(),
                    title: "Nodes".to_string(),
                    panels: vec![Panel {
                        id: 7,
                        panel_type: "stat".to_string(),
                        grid_pos: GridPos { x: 0, y: 0, w: 24, h: 4 },
                        ..Default::default()
                    }],
                },
                meta: DashboardMeta {
                    slug: "nodes".to_string(),
                },
            })
        }

        async fn render_panel(&self, _url: &str, _auth_header: &str) -> anyhow::Result<Bytes> {
            Ok(Bytes::from_static(b"\x89PNG"))
        }
    }

    struct StubAssembler;

    #[async_trait]
    impl DocumentAssembler for StubAssembler {
        async fn assemble(&self, document: ReportDocument<'_>) -> Result<Vec<u8>, AssemblyError> {
            Ok(format!("%PDF {}", document.template).into_bytes())
        }
    }

    fn state(scratch: &std::path::Path) -> Arc<AppState> {
        let repository = Arc::new(StubGrafana);
        let orchestrator = PanelFetchOrchestrator::new(
            repository.clone(),
            FetchSettings {
                theme: "light".to_string(),
                screen_resolution_width: 1920,
                max_concurrent_requests: 4,
                scratch_dir: scratch.to_path_buf(),
            },
        );
        let templates: TemplateRegistry = [("gridTemplate".to_string(), "grid".to_string())]
            .into_iter()
            .collect();
        Arc::new(AppState {
            report_service: ReportService::new(
                repository,
                orchestrator,
                Arc::new(StubAssembler),
                Arc::new(templates),
                ReportOptions {
                    defaults: ReportDefaults {
                        template: "gridTemplate".to_string(),
                        from: "now-1h".to_string(),
                        to: "now".to_string(),
                    },
                    render_collapsed: false,
                    save_temp_images: false,
                },
            ),
            credentials_file: None,
        })
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_report_request() {
        let request = report_request(
            "nodes",
            pairs(&[
                ("from", "now-6h"),
                ("from", "now-1h"),
                ("renderCollapsed", "TRUE"),
                ("var-host", "a"),
                ("var-host", "b"),
                ("other", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(request.dashboard_uid, "nodes");
        assert_eq!(request.from.as_deref(), Some("now-6h"));
        assert_eq!(request.to, None);
        assert_eq!(request.render_collapsed, Some(true));
        assert_eq!(request.variables.encode(), "var-host=a&var-host=b");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("t"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[tokio::test]
    async fn test_generate_report() {
        let scratch = tempfile::tempdir().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));

        let response = generate_report(
            Path("nodes".to_string()),
            Query(pairs(&[("from", "now-1h"), ("to", "now")])),
            headers,
            State(state(scratch.path())),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"nodes_report_now-1h-now.pdf\""
        );
    }

    #[tokio::test]
    async fn test_generate_report_errors() {
        let scratch = tempfile::tempdir().unwrap();

        let response = generate_report(
            Path("nodes".to_string()),
            Query(Vec::new()),
            HeaderMap::new(),
            State(state(scratch.path())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        let response = generate_report(
            Path("nodes".to_string()),
            Query(pairs(&[("template", "missing")])),
            headers.clone(),
            State(state(scratch.path())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        let response = generate_report(
            Path("nodes".to_string()),
            Query(Vec::new()),
            headers,
            State(state(scratch.path())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_templates_and_defaults() {
        let scratch = tempfile::tempdir().unwrap();
        let state = state(scratch.path());

        let Json(names) = list_templates(State(state.clone())).await;
        assert_eq!(names, vec!["gridTemplate"]);

        let Json(template) = get_template(Path("gridTemplate".to_string()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(template["gridTemplate"], "grid");

        let err = get_template(Path("nope".to_string()), State(state.clone())).await.unwrap_err();
        assert!(matches!(err, ReportError::TemplateNotFound(_)));

        let Json(defaults) = get_defaults(State(state)).await;
        assert_eq!(defaults.from, "now-1h");
    }
}
