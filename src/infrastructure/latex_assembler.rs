// LaTeX assembler - Fills a report template and typesets it into a PDF
use crate::application::document_assembler::{AssemblyError, DocumentAssembler, ReportDocument};
use crate::domain::dashboard::StructuredDashboard;
use crate::domain::timerange::TIMESTAMP_FORMAT;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// Intermediate files the typesetter leaves next to the report
const ARTIFACT_EXTENSIONS: [&str; 5] = ["tex", "aux", "log", "out", "pdf"];

#[derive(Debug, Clone)]
pub struct LatexAssembler {
    output_dir: PathBuf,
    typesetter: String,
    typesetter_args: Vec<String>,
    screen_resolution_width: i32,
}

impl LatexAssembler {
    pub fn new(
        output_dir: PathBuf,
        typesetter: String,
        typesetter_args: Vec<String>,
        screen_resolution_width: i32,
    ) -> Self {
        Self {
            output_dir,
            typesetter,
            typesetter_args,
            screen_resolution_width,
        }
    }

    fn template_values(&self, document: &ReportDocument<'_>) -> HashMap<&'static str, String> {
        let dashboard = document.dashboard;
        let range = document.time_range;
        HashMap::from([
            ("title", escape_latex(&dashboard.title)),
            ("uid", escape_latex(&dashboard.uid)),
            ("slug", escape_latex(&dashboard.slug)),
            ("request_id", escape_latex(&dashboard.request_id)),
            ("from", escape_latex(&range.from)),
            ("to", escape_latex(&range.to)),
            ("timestamp_from", range.date_from.format(TIMESTAMP_FORMAT).to_string()),
            ("timestamp_to", range.date_to.format(TIMESTAMP_FORMAT).to_string()),
            ("vars", escape_latex(&document.variables.encode().replace('&', " "))),
            ("panels_dir", latex_path(document.panels_dir)),
            (
                "body",
                panel_grid(dashboard, document.panels_dir, self.screen_resolution_width),
            ),
        ])
    }

    async fn typeset(&self, tex_file: &str) -> Result<(), AssemblyError> {
        let mut command = Command::new(&self.typesetter);
        command
            .args(&self.typesetter_args)
            .arg("-interaction=nonstopmode")
            .arg(format!("-output-directory={}", self.output_dir.display()))
            .arg(tex_file)
            .current_dir(&self.output_dir);

        let output = command.output().await.map_err(|e| AssemblyError::Typesetter {
            command: self.typesetter.clone(),
            detail: e.to_string(),
        })?;
        tracing::debug!(
            "{} finished with {}: {}",
            self.typesetter,
            output.status,
            String::from_utf8_lossy(&output.stdout)
        );

        if !output.status.success() {
            return Err(AssemblyError::Typesetter {
                command: self.typesetter.clone(),
                detail: format!("{}: {}", output.status, tail(&output.stdout, 10)),
            });
        }
        Ok(())
    }

    async fn remove_artifacts(&self, request_id: &str) {
        for extension in ARTIFACT_EXTENSIONS {
            let path = self.output_dir.join(format!("{}.{}", request_id, extension));
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not remove {}: {}", path.display(), err);
                }
            }
        }
    }
}

#[async_trait]
impl DocumentAssembler for LatexAssembler {
    async fn assemble(&self, document: ReportDocument<'_>) -> Result<Vec<u8>, AssemblyError> {
        let request_id = document.dashboard.request_id.clone();
        let source = render_template(document.template, &self.template_values(&document))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let tex_file = format!("{}.tex", request_id);
        tokio::fs::write(self.output_dir.join(&tex_file), source).await?;

        self.typeset(&tex_file).await?;
        let content = read_report(&self.output_dir, &request_id).await?;

        // Failed runs keep their sources and logs for inspection
        self.remove_artifacts(&request_id).await;
        Ok(content)
    }
}

/// Replace every `[[ name ]]` placeholder; unknown names are an error.
///
/// There are no loops or conditionals: rows and panels reach the template only
/// through the generated `[[ body ]]`, so a directive such as `[[range .Rows]]`
/// fails as an unknown placeholder.
pub fn render_template(template: &str, values: &HashMap<&'static str, String>) -> Result<String, AssemblyError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).ok_or_else(|| {
            AssemblyError::Template(format!(
                "unclosed placeholder at byte {}",
                template.len() - rest.len() + start
            ))
        })?;

        let key = after[..end].trim();
        let value = values
            .get(key)
            .ok_or_else(|| AssemblyError::Template(format!("unknown placeholder {:?}", key)))?;
        rendered.push_str(value);
        rest = &after[end + CLOSE.len()..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// LaTeX rendition of the dashboard grid, one titled section per row
fn panel_grid(dashboard: &StructuredDashboard, panels_dir: &Path, screen_width: i32) -> String {
    let mut body = String::new();
    for row in &dashboard.rows {
        if !row.title.is_empty() {
            let _ = writeln!(body, "\\section*{{{}}}", escape_latex(&row.title));
        }
        for (index, panel) in row.panels.iter().enumerate() {
            if index == 0 || panel.is_leftmost() {
                body.push_str("\\par\\noindent\n");
            }
            let image = panels_dir.join(format!("{}.png", panel.id));
            let _ = write!(
                body,
                "\\includegraphics[width={:.3}\\textwidth]{{{}}}",
                panel.relative_width(screen_width),
                latex_path(&image)
            );
            if panel.is_rightmost() {
                body.push_str("\\par\n");
            } else {
                body.push_str("\\hspace{0.005\\textwidth}%\n");
            }
        }
    }
    body
}

/// Read the typeset report; a missing or empty file is a failure
pub async fn read_report(output_dir: &Path, request_id: &str) -> Result<Vec<u8>, AssemblyError> {
    let path = output_dir.join(format!("{}.pdf", request_id));
    match tokio::fs::read(&path).await {
        Ok(content) if content.is_empty() => Err(AssemblyError::Empty(path)),
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AssemblyError::Missing(path)),
        Err(err) => Err(err.into()),
    }
}

pub fn escape_latex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '~' => escaped.push_str("\\textasciitilde{}"),
            '^' => escaped.push_str("\\textasciicircum{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

fn latex_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn tail(output: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
