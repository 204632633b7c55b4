use crate::application::panel_fetch::{FetchSettings, DEFAULT_MAX_CONCURRENT_REQUESTS};
use crate::application::report_service::{ReportDefaults, ReportOptions};
use crate::application::template_registry::TemplateRegistry;
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub grafana: GrafanaSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub templates: TemplatesSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8881".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GrafanaSettings {
    pub endpoint: String,
    /// YAML file with `user`/`password` or `apiKey`, used when a request has no Authorization header
    pub credentials_file: Option<PathBuf>,
    pub insecure_skip_verify: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl Default for GrafanaSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://grafana-service:3000".to_string(),
            credentials_file: Some(PathBuf::from("/grafana/auth/credentials.yaml")),
            insecure_skip_verify: true,
            ca_file: None,
            cert_file: None,
            key_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportSettings {
    pub default_template: String,
    pub default_from: String,
    pub default_to: String,
    pub render_collapsed: bool,
    pub theme: String,
    pub screen_resolution_width: i32,
    pub max_concurrent_render_requests: usize,
    pub scratch_dir: PathBuf,
    pub save_temp_images: bool,
    pub typesetter: String,
    pub typesetter_args: Vec<String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            default_template: "gridTemplate".to_string(),
            default_from: "now-30m".to_string(),
            default_to: "now".to_string(),
            render_collapsed: false,
            theme: "light".to_string(),
            screen_resolution_width: 1920,
            max_concurrent_render_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            scratch_dir: std::env::temp_dir(),
            save_temp_images: false,
            typesetter: "pdflatex".to_string(),
            typesetter_args: Vec::new(),
        }
    }
}

impl ReportSettings {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            theme: self.theme.clone(),
            screen_resolution_width: self.screen_resolution_width,
            max_concurrent_requests: self.max_concurrent_render_requests,
            scratch_dir: self.scratch_dir.clone(),
        }
    }

    pub fn options(&self) -> ReportOptions {
        ReportOptions {
            defaults: ReportDefaults {
                template: self.default_template.clone(),
                from: self.default_from.clone(),
                to: self.default_to.clone(),
            },
            render_collapsed: self.render_collapsed,
            save_temp_images: self.save_temp_images,
        }
    }

    /// Where the typesetter writes its sources and output documents
    pub fn reports_dir(&self) -> PathBuf {
        self.scratch_dir.join("reports")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TemplatesSettings {
    pub path: PathBuf,
    pub custom_path: PathBuf,
}

impl Default for TemplatesSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates"),
            custom_path: PathBuf::from("templates/custom"),
        }
    }
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    load_config_from("config/reporter")
}

/// Built-in defaults, then the optional config file, then `REPORTER_*` environment variables
/// (nested keys separated by `__`, e.g. `REPORTER_REPORT__MAX_CONCURRENT_RENDER_REQUESTS`).
pub fn load_config_from(file: &str) -> anyhow::Result<AppConfig> {
    load_config_with(file, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("REPORTER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_config_with(file: &str, environment: config::Environment) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(environment)
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Read all templates, custom ones overriding built-in ones with the same name.
/// A template is named after its file name without extension.
pub fn load_templates(settings: &TemplatesSettings, default_template: &str) -> anyhow::Result<TemplateRegistry> {
    let mut templates = BTreeMap::new();
    for dir in [&settings.path, &settings.custom_path] {
        read_templates_dir(dir, &mut templates)?;
    }

    if !templates.contains_key(default_template) {
        anyhow::bail!(
            "could not find default template {:?} in directories {} and {}",
            default_template,
            settings.path.display(),
            settings.custom_path.display()
        );
    }

    tracing::info!("Loaded {} report templates", templates.len());
    Ok(TemplateRegistry::new(templates))
}

fn read_templates_dir(dir: &Path, templates: &mut BTreeMap<String, String>) -> anyhow::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("could not read templates from {}", dir.display())),
    };

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read template {}", path.display()))?;
        templates.insert(name.to_string(), content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8881");
        assert_eq!(config.report.default_from, "now-30m");
        assert_eq!(config.report.max_concurrent_render_requests, 4);
        assert_eq!(config.templates.custom_path, PathBuf::from("templates/custom"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("reporter.toml");
        std::fs::write(
            &file,
            "[grafana]\nendpoint = \"https://grafana.example:3000\"\n\n[report]\nmax_concurrent_render_requests = 8\ntheme = \"dark\"\n",
        )
        .unwrap();

        let config = load_config_from(dir.path().join("reporter").to_str().unwrap()).unwrap();
        assert_eq!(config.grafana.endpoint, "https://grafana.example:3000");
        assert_eq!(config.report.max_concurrent_render_requests, 8);
        assert_eq!(config.report.theme, "dark");
        // Untouched keys keep their defaults
        assert_eq!(config.report.default_template, "gridTemplate");
        assert_eq!(config.server.listen, "0.0.0.0:8881");

        let fetch = config.report.fetch_settings();
        assert_eq!(fetch.max_concurrent_requests, 8);
        assert_eq!(fetch.theme, "dark");
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("reporter.toml"),
            "[report]\nmax_concurrent_render_requests = 2\ntheme = \"dark\"\n",
        )
        .unwrap();
        let variables: config::Map<String, String> = [
            ("REPORTER_REPORT__MAX_CONCURRENT_RENDER_REQUESTS", "8"),
            ("REPORTER_GRAFANA__ENDPOINT", "https://grafana.internal"),
            ("OTHER_REPORT__THEME", "light"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = load_config_with(
            dir.path().join("reporter").to_str().unwrap(),
            environment().source(Some(variables)),
        )
        .unwrap();
        assert_eq!(config.report.max_concurrent_render_requests, 8);
        assert_eq!(config.grafana.endpoint, "https://grafana.internal");
        assert_eq!(config.report.theme, "dark");
    }

    #[test]
    fn test_load_templates_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TemplatesSettings {
            path: dir.path().join("templates"),
            custom_path: dir.path().join("templates/custom"),
        };
        std::fs::create_dir_all(&settings.custom_path).unwrap();
        std::fs::write(settings.path.join("gridTemplate.tex"), "grid").unwrap();
        std::fs::write(settings.path.join("compact.tex"), "compact").unwrap();
        std::fs::write(settings.custom_path.join("compact.tex"), "custom compact").unwrap();
        std::fs::write(settings.custom_path.join(".gitkeep"), "").unwrap();

        let registry = load_templates(&settings, "gridTemplate").unwrap();
        assert_eq!(registry.names(), vec!["compact", "gridTemplate"]);
        assert_eq!(registry.get("compact"), Some("custom compact"));
    }

    #[test]
    fn test_load_templates_requires_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TemplatesSettings {
            path: dir.path().to_path_buf(),
            custom_path: dir.path().join("missing"),
        };
        std::fs::write(dir.path().join("other.tex"), "x").unwrap();

        let err = load_templates(&settings, "gridTemplate").unwrap_err();
        assert!(err.to_string().contains("gridTemplate"));
    }
}
