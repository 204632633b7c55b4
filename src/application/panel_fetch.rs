// Panel fetch orchestrator - Renders every dashboard panel into the request scratch directory
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::{Panel, StructuredDashboard};
use crate::domain::report::FilterVariables;
use crate::domain::timerange::TimeRange;
use anyhow::Context;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

pub const RENDER_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not create URL for request Grafana panel {panel_id}: {reason}")]
    UrlConstruction { panel_id: i64, reason: String },
    #[error("could not get all panels successfully: {failed} of {total} panels failed (panel ids {panel_ids:?})")]
    PanelsFailed {
        failed: usize,
        total: usize,
        panel_ids: Vec<i64>,
    },
    #[error("panel task did not complete: {0}")]
    Task(String),
}

/// Per-process settings for panel rendering, passed in explicitly
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub theme: String,
    pub screen_resolution_width: i32,
    pub max_concurrent_requests: usize,
    pub scratch_dir: PathBuf,
}

impl FetchSettings {
    pub fn panels_dir(&self, request_id: &str) -> PathBuf {
        self.scratch_dir.join(request_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRenderRequest {
    pub panel_id: i64,
    pub image_name: String,
    pub url: String,
}

/// Everything a render URL needs besides the panel itself
struct RenderContext {
    endpoint: String,
    uid: String,
    slug: String,
    theme: String,
    screen_width: i32,
    from_ms: i64,
    to_ms: i64,
    variables: FilterVariables,
}

impl RenderContext {
    fn render_request(&self, panel: &Panel) -> Result<PanelRenderRequest, FetchError> {
        let invalid = |reason: String| FetchError::UrlConstruction {
            panel_id: panel.id,
            reason,
        };

        let (Some(width), Some(height)) = (panel.px_width(self.screen_width), panel.px_height(self.screen_width)) else {
            return Err(invalid(format!(
                "panel size {}x{} grid units overflows the pixel range",
                panel.grid_pos.w, panel.grid_pos.h
            )));
        };
        if width <= 0 || height <= 0 {
            return Err(invalid(format!("panel has no visible size ({}x{} px)", width, height)));
        }

        let mut url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot be used as a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(
                ["render", "d-solo", self.uid.as_str(), self.slug.as_str()]
                    .into_iter()
                    .filter(|segment| !segment.is_empty()),
            );

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.variables.iter() {
                query.append_pair(key, value);
            }
            query
                .append_pair("panelId", &panel.id.to_string())
                .append_pair("theme", &self.theme)
                .append_pair("from", &self.from_ms.to_string())
                .append_pair("to", &self.to_ms.to_string())
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string());
        }

        Ok(PanelRenderRequest {
            panel_id: panel.id,
            image_name: format!("{}.png", panel.id),
            url: url.into(),
        })
    }
}

/// Compose one render request per panel. Panels are processed concurrently; the
/// first error is returned once every construction task has finished.
pub async fn build_render_requests(
    endpoint: &str,
    dashboard: &StructuredDashboard,
    time_range: &TimeRange,
    variables: &FilterVariables,
    settings: &FetchSettings,
) -> Result<Vec<PanelRenderRequest>, FetchError> {
    let context = Arc::new(RenderContext {
        endpoint: endpoint.to_string(),
        uid: dashboard.uid.clone(),
        slug: dashboard.slug.clone(),
        theme: settings.theme.clone(),
        screen_width: settings.screen_resolution_width,
        from_ms: time_range.date_from.timestamp_millis(),
        to_ms: time_range.date_to.timestamp_millis(),
        variables: variables.clone(),
    });
    let collected = Arc::new(Mutex::new(Vec::with_capacity(dashboard.panel_count())));

    let mut tasks = JoinSet::new();
    for panel in dashboard.panels() {
        let panel = panel.clone();
        let context = context.clone();
        let collected = collected.clone();
        tasks.spawn(async move {
            let request = context.render_request(&panel)?;
            collected.lock().await.push(request);
            Ok::<(), FetchError>(())
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(|e| FetchError::Task(e.to_string()))
            .and_then(|result| result);
        if let Err(err) = outcome {
            first_error.get_or_insert(err);
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    let requests = std::mem::take(&mut *collected.lock().await);
    Ok(requests)
}

#[derive(Clone)]
pub struct PanelFetchOrchestrator {
    repository: Arc<dyn DashboardRepository>,
    settings: FetchSettings,
}

impl PanelFetchOrchestrator {
    pub fn new(repository: Arc<dyn DashboardRepository>, settings: FetchSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Render every panel of the dashboard and return the directory holding the images
    pub async fn fetch(
        &self,
        dashboard: &StructuredDashboard,
        time_range: &TimeRange,
        variables: &FilterVariables,
        auth_header: &str,
    ) -> Result<PathBuf, FetchError> {
        let requests = build_render_requests(
            self.repository.endpoint(),
            dashboard,
            time_range,
            variables,
            &self.settings,
        )
        .await?;
        tracing::debug!(
            "Built {} render requests for report {}",
            requests.len(),
            dashboard.request_id
        );

        self.fetch_panels(requests, &dashboard.request_id, auth_header).await
    }

    /// Fetch all requests with at most `max_concurrent_requests` in flight.
    ///
    /// Every task runs to completion; the outcome is only evaluated after all of
    /// them have been joined, and any panel that exhausted its attempts turns the
    /// whole call into a single `PanelsFailed` error.
    pub async fn fetch_panels(
        &self,
        requests: Vec<PanelRenderRequest>,
        request_id: &str,
        auth_header: &str,
    ) -> Result<PathBuf, FetchError> {
        let panels_dir = self.settings.panels_dir(request_id);
        let total = requests.len();
        let gate = Arc::new(Semaphore::new(self.settings.max_concurrent_requests.max(1)));
        // Best-effort signal: only stops new retries, never interrupts a running attempt
        let failure_seen = Arc::new(AtomicBool::new(false));
        let auth_header: Arc<str> = Arc::from(auth_header);

        let mut failed_ids = Vec::new();
        let mut failed = 0usize;
        let mut tasks = JoinSet::new();

        for request in requests {
            let permit = match gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    failed += 1;
                    failed_ids.push(request.panel_id);
                    continue;
                }
            };
            let repository = self.repository.clone();
            let panels_dir = panels_dir.clone();
            let failure_seen = failure_seen.clone();
            let auth_header = auth_header.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = fetch_with_retry(
                    repository.as_ref(),
                    &request,
                    &panels_dir,
                    &auth_header,
                    &failure_seen,
                )
                .await;
                (request.panel_id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((panel_id, Err(err))) => {
                    tracing::error!(panel_id, "Could not get panel: {:#}", err);
                    failed += 1;
                    failed_ids.push(panel_id);
                }
                Err(err) => {
                    tracing::error!("Panel task did not complete: {}", err);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            failed_ids.sort_unstable();
            return Err(FetchError::PanelsFailed {
                failed,
                total,
                panel_ids: failed_ids,
            });
        }

        tracing::debug!("All the panels successfully saved to {}", panels_dir.display());
        Ok(panels_dir)
    }
}

async fn fetch_with_retry(
    repository: &dyn DashboardRepository,
    request: &PanelRenderRequest,
    panels_dir: &Path,
    auth_header: &str,
    failure_seen: &AtomicBool,
) -> anyhow::Result<()> {
    let mut attempt = 1;
    loop {
        let err = match fetch_and_save(repository, request, panels_dir, auth_header).await {
            Ok(path) => {
                tracing::info!(panel_id = request.panel_id, path = %path.display(), "Panel successfully saved to file");
                return Ok(());
            }
            Err(err) => err,
        };

        if attempt >= RENDER_ATTEMPTS {
            failure_seen.store(true, Ordering::Relaxed);
            return Err(err.context(format!("giving up after {} attempts", attempt)));
        }

        tracing::warn!(
            panel_id = request.panel_id,
            "Error occurred when requesting panel, retrying in {:?} ({} attempts left): {:#}",
            RETRY_DELAY,
            RENDER_ATTEMPTS - attempt,
            err
        );
        tokio::time::sleep(RETRY_DELAY).await;

        if failure_seen.load(Ordering::Relaxed) {
            return Err(err.context("retry skipped because another panel already failed"));
        }
        attempt += 1;
    }
}

async fn fetch_and_save(
    repository: &dyn DashboardRepository,
    request: &PanelRenderRequest,
    panels_dir: &Path,
    auth_header: &str,
) -> anyhow::Result<PathBuf> {
    tracing::debug!(panel_id = request.panel_id, "Requesting panel by url: {}", request.url);
    let image = repository.render_panel(&request.url, auth_header).await?;

    tokio::fs::create_dir_all(panels_dir)
        .await
        .with_context(|| format!("could not create directory for panel on path {}", panels_dir.display()))?;
    let path = panels_dir.join(&request.image_name);
    tokio::fs::write(&path, &image)
        .await
        .with_context(|| format!("could not save image of panel to file {}", path.display()))?;

    Ok(path)
}

/// Remove rendered panel images of a finished request, then the directory if it is empty
pub async fn discard_panel_images(panels_dir: &Path) {
    let mut entries = match tokio::fs::read_dir(panels_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            tracing::error!(path = %panels_dir.display(), "Could not read directory of images: {}", err);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(path = %panels_dir.display(), "Could not list directory of images: {}", err);
                return;
            }
        };
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::error!(file = %path.display(), "Could not delete image file: {}", err);
            }
        }
    }

    // Fails harmlessly when something other than images was left behind
    let _ = tokio::fs::remove_dir(panels_dir).await;
}
