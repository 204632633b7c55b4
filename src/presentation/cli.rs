// Command line interface - HTTP service or one-shot report generation
use crate::application::errors::ReportError;
use crate::application::report_service::{ReportRequest, ReportService};
use crate::domain::report::FilterVariables;
use crate::infrastructure::credentials::{resolve_auth_header, Credentials};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "grafana-reporter", version)]
pub struct Cli {
    /// Defaults to `serve`.
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve reports over HTTP.
    Serve,
    /// Generate a single report and write it as a PDF.
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Dashboard uid.
    #[arg(long)]
    pub dashboard: String,

    /// Start of the time range, e.g. `now-6h`. Configured default when omitted.
    #[arg(long)]
    pub from: Option<String>,

    /// End of the time range. Configured default when omitted.
    #[arg(long)]
    pub to: Option<String>,

    /// Template name. Configured default when omitted.
    #[arg(long)]
    pub template: Option<String>,

    /// Dashboard variables as a query string, e.g. `var-host=a&var-host=b`.
    #[arg(long, default_value = "")]
    pub vars: String,

    /// Include panels of collapsed rows.
    #[arg(long)]
    pub render_collapsed: Option<bool>,

    /// Grafana user, used together with `--password`.
    #[arg(long, default_value = "")]
    pub user: String,

    #[arg(long, default_value = "")]
    pub password: String,

    /// Grafana API token, wins over user and password.
    #[arg(long, default_value = "")]
    pub token: String,

    /// Directory receiving `<request id>.pdf`. The configured reports directory when omitted.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl GenerateArgs {
    /// Every variable key must carry the `var-` prefix, otherwise nothing is generated.
    pub fn report_request(&self) -> Result<ReportRequest, ReportError> {
        Ok(ReportRequest {
            dashboard_uid: self.dashboard.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            template: self.template.clone(),
            render_collapsed: self.render_collapsed,
            variables: FilterVariables::parse_query(&self.vars)?,
        })
    }

    /// Token or user and password from the flags, otherwise the credentials file.
    pub async fn auth_header(&self, credentials_file: Option<&Path>) -> Result<String, ReportError> {
        let credentials = Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
            api_key: self.token.clone(),
        };
        match credentials.auth_header() {
            Some(header) => Ok(header),
            None => resolve_auth_header(None, credentials_file).await,
        }
    }
}

/// Generate one report and write it into `output_dir`, returning the file path.
pub async fn run_generate(
    service: &ReportService,
    args: &GenerateArgs,
    output_dir: &Path,
    credentials_file: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let request = args.report_request()?;
    let auth_header = args.auth_header(credentials_file).await?;

    let report = service.generate_report(request, &auth_header).await?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("could not create output directory {}", output_dir.display()))?;
    let path = output_dir.join(report.file_name());
    tokio::fs::write(&path, &report.content)
        .await
        .with_context(|| format!("could not write report {}", path.display()))?;

    tracing::info!("Report {} written to {}", report.request_id, path.display());
    Ok(path)
}
