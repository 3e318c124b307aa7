//! Render dispatch: turns a diagram description into an artifact on disk.
//!
//! Image and text formats go through an external PlantUML renderer, either a
//! server reached over HTTP or a local command fed on stdin. Markup formats
//! are written as-is. Nothing here is retried; the caller decides.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::diagram::{DiagramDescription, DiagramGrammar, UnsupportedGrammarError};

pub const DEFAULT_SERVER_URL: &str = "https://www.plantuml.com/plantuml";

const SUPPORTED_FORMATS: &[&str] = &["svg", "png", "txt", "puml", "mmd"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Svg,
    Png,
    Txt,
    Puml,
    Mmd,
}

impl OutputFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Txt => "txt",
            Self::Puml => "puml",
            Self::Mmd => "mmd",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Txt | Self::Puml | Self::Mmd => "text/plain; charset=utf-8",
        }
    }

    /// Grammar the description must be compiled into for this format.
    #[must_use]
    pub const fn grammar(self) -> DiagramGrammar {
        match self {
            Self::Mmd => DiagramGrammar::Mermaid,
            Self::Svg | Self::Png | Self::Txt | Self::Puml => DiagramGrammar::PlantUml,
        }
    }

    #[must_use]
    pub const fn needs_renderer(self) -> bool {
        matches!(self, Self::Svg | Self::Png | Self::Txt)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = UnsupportedGrammarError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "txt" | "text" => Ok(Self::Txt),
            "puml" | "plantuml" => Ok(Self::Puml),
            "mmd" | "mermaid" => Ok(Self::Mmd),
            _ => Err(UnsupportedGrammarError::new(value.trim(), SUPPORTED_FORMATS)),
        }
    }
}

/// Where image and text formats are rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBackend {
    /// A PlantUML server; the source is POSTed to `{server_url}/{format}`.
    Http { server_url: String },
    /// A local PlantUML command run as `program args... -pipe -t{format}`.
    Command { program: String, args: Vec<String> },
}

impl RenderBackend {
    fn target(&self) -> String {
        match self {
            Self::Http { server_url } => server_url.clone(),
            Self::Command { program, .. } => program.clone(),
        }
    }
}

impl Default for RenderBackend {
    fn default() -> Self {
        Self::Http {
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub backend: RenderBackend,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl RenderConfig {
    pub fn new(backend: RenderBackend, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Location and shape of a written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub location: String,
    pub format: OutputFormat,
    pub media_type: String,
    pub bytes: usize,
    pub rendered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum RenderError {
    Unreachable { target: String, cause: String },
    Timeout { target: String, after: Duration },
    Rejected { target: String, status: String, detail: String },
    Io { path: PathBuf, cause: io::Error },
    Spawn { program: String, cause: io::Error },
    GrammarMismatch { format: OutputFormat, grammar: DiagramGrammar },
}

impl RenderError {
    /// The server, program, or path the failure refers to.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::Unreachable { target, .. }
            | Self::Timeout { target, .. }
            | Self::Rejected { target, .. } => target.clone(),
            Self::Io { path, .. } => path.display().to_string(),
            Self::Spawn { program, .. } => program.clone(),
            Self::GrammarMismatch { format, .. } => format.to_string(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { target, cause } => {
                write!(f, "renderer {target} is unreachable: {cause}")
            }
            Self::Timeout { target, after } => write!(
                f,
                "renderer {target} timed out after {}ms",
                after.as_millis()
            ),
            Self::Rejected {
                target,
                status,
                detail,
            } => {
                if detail.is_empty() {
                    write!(f, "renderer {target} rejected the diagram ({status})")
                } else {
                    write!(f, "renderer {target} rejected the diagram ({status}): {detail}")
                }
            }
            Self::Io { path, cause } => {
                write!(f, "failed to write artifact {}: {cause}", path.display())
            }
            Self::Spawn { program, cause } => {
                write!(f, "failed to start renderer {program}: {cause}")
            }
            Self::GrammarMismatch { format, grammar } => {
                write!(f, "format {format} cannot be produced from {grammar} source")
            }
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { cause, .. } | Self::Spawn { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

pub struct RenderDispatch {
    config: RenderConfig,
    client: reqwest::Client,
}

impl RenderDispatch {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Produces `{output_dir}/{stem}.{ext}` from `description`.
    ///
    /// # Errors
    /// Returns a `RenderError` when the renderer fails, times out, or the
    /// artifact cannot be written.
    pub async fn render(
        &self,
        description: &DiagramDescription,
        format: OutputFormat,
        stem: &str,
    ) -> Result<ArtifactRef, RenderError> {
        if description.grammar != format.grammar() {
            return Err(RenderError::GrammarMismatch {
                format,
                grammar: description.grammar,
            });
        }

        let bytes = if format.needs_renderer() {
            let rendered = match &self.config.backend {
                RenderBackend::Http { server_url } => {
                    self.render_http(server_url, &description.source, format).await
                }
                RenderBackend::Command { program, args } => {
                    self.render_command(program, args, &description.source, format)
                        .await
                }
            };
            rendered.inspect_err(|err| {
                warn!(
                    renderer = %self.config.backend.target(),
                    format = %format,
                    error = %err,
                    "render failed"
                );
            })?
        } else {
            description.source.clone().into_bytes()
        };

        let path = artifact_path(&self.config.output_dir, stem, format);
        write_artifact(&path, &bytes).await?;
        info!(location = %path.display(), format = %format, bytes = bytes.len(), "artifact written");

        Ok(ArtifactRef {
            location: path.display().to_string(),
            format,
            media_type: format.media_type().to_string(),
            bytes: bytes.len(),
            rendered_at: Utc::now(),
        })
    }

    async fn render_http(
        &self,
        server_url: &str,
        source: &str,
        format: OutputFormat,
    ) -> Result<Vec<u8>, RenderError> {
        let url = format!("{}/{}", server_url.trim_end_matches('/'), format.as_str());
        let timeout = self.config.timeout;
        let classify = |err: reqwest::Error| {
            if err.is_timeout() {
                RenderError::Timeout {
                    target: url.clone(),
                    after: timeout,
                }
            } else {
                RenderError::Unreachable {
                    target: url.clone(),
                    cause: err.to_string(),
                }
            }
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(timeout)
            .body(source.to_string())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RenderError::Rejected {
                target: url.clone(),
                status: format!("HTTP {}", status.as_u16()),
                detail: excerpt(&detail),
            });
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }

    async fn render_command(
        &self,
        program: &str,
        args: &[String],
        source: &str,
        format: OutputFormat,
    ) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(program)
            .args(args)
            .arg("-pipe")
            .arg(format!("-t{}", format.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|cause| RenderError::Spawn {
                program: program.to_string(),
                cause,
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };

        // Dropping the child on timeout kills it.
        let run = async move { tokio::join!(feed, child.wait_with_output()) };
        let (fed, output) = tokio::time::timeout(self.config.timeout, run)
            .await
            .map_err(|_| RenderError::Timeout {
                target: program.to_string(),
                after: self.config.timeout,
            })?;

        let output = output.map_err(|cause| RenderError::Spawn {
            program: program.to_string(),
            cause,
        })?;
        if !output.status.success() {
            return Err(RenderError::Rejected {
                target: program.to_string(),
                status: output.status.to_string(),
                detail: excerpt(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        fed.map_err(|cause| RenderError::Spawn {
            program: program.to_string(),
            cause,
        })?;
        Ok(output.stdout)
    }
}

/// File stem for a schema's artifact.
///
/// Names that are already filesystem safe are used as they are. Any other
/// name is sanitized and suffixed with a digest of the original, so two
/// schemas never share a stem.
#[must_use]
pub fn artifact_stem(schema_name: &str) -> String {
    let stem: String = schema_name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let stem = match stem.trim_matches('.') {
        "" => "schema",
        trimmed => trimmed,
    };
    if stem == schema_name {
        return stem.to_string();
    }
    let digest = Sha256::digest(schema_name.as_bytes());
    format!("{stem}-{}", hex::encode(&digest[..4]))
}

fn artifact_path(output_dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(format!("{}.{}", artifact_stem(stem), format.extension()))
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling of `path` that no other writer in any process will pick.
fn staging_path(path: &Path) -> PathBuf {
    let sequence = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{sequence}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Writes `bytes` to a staging file and renames it over `path`, so readers
/// and concurrent writers only ever see a complete artifact.
async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|cause| RenderError::Io {
                path: parent.to_path_buf(),
                cause,
            })?;
    }
    let staging = staging_path(path);
    let written = match tokio::fs::write(&staging, bytes).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(cause) => Err(cause),
    };
    if let Err(cause) = written {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(RenderError::Io {
            path: path.to_path_buf(),
            cause,
        });
    }
    Ok(())
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 200;
    let text = text.trim();
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats_and_aliases() {
        assert_eq!("SVG".parse::<OutputFormat>(), Ok(OutputFormat::Svg));
        assert_eq!("plantuml".parse::<OutputFormat>(), Ok(OutputFormat::Puml));
        assert_eq!("mermaid".parse::<OutputFormat>(), Ok(OutputFormat::Mmd));
        let err = "pdf".parse::<OutputFormat>().expect_err("pdf is not supported");
        assert_eq!(err.requested, "pdf");
        assert!(err.to_string().contains("svg, png, txt, puml, mmd"));
    }

    #[test]
    fn formats_map_to_grammars() {
        assert_eq!(OutputFormat::Svg.grammar(), DiagramGrammar::PlantUml);
        assert_eq!(OutputFormat::Mmd.grammar(), DiagramGrammar::Mermaid);
        assert!(OutputFormat::Png.needs_renderer());
        assert!(!OutputFormat::Puml.needs_renderer());
    }

    #[test]
    fn stems_are_filesystem_safe() {
        assert_eq!(artifact_stem("public"), "public");
        assert_eq!(artifact_stem("sales-2024.q1"), "sales-2024.q1");
        assert!(artifact_stem("../etc/passwd").starts_with("_etc_passwd-"));
        assert!(artifact_stem("my schema").starts_with("my_schema-"));
        assert!(artifact_stem("  ").starts_with("schema-"));
        assert!(!artifact_stem("a/b").contains('/'));
    }

    #[test]
    fn distinct_schemas_never_share_a_stem() {
        let stems = ["my schema", "my_schema", "my/schema", "my-schema", "my.schema", "my\tschema"]
            .map(artifact_stem);
        for (index, stem) in stems.iter().enumerate() {
            assert!(!stems[index + 1..].contains(stem), "{stem} repeats");
        }
        assert_eq!(artifact_stem("my schema"), artifact_stem("my schema"));
        assert_eq!(artifact_stem("my schema").len(), "my_schema-".len() + 8);
    }

    #[tokio::test]
    async fn concurrent_writes_of_one_artifact_leave_a_whole_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatch = RenderDispatch::new(RenderConfig::new(RenderBackend::default(), dir.path()));
        let first = DiagramDescription {
            grammar: DiagramGrammar::Mermaid,
            source: format!("erDiagram\n{}", "  a {\n  }\n".repeat(4096)),
        };
        let second = DiagramDescription {
            grammar: DiagramGrammar::Mermaid,
            source: format!("erDiagram\n{}", "  bb {\n  }\n".repeat(2048)),
        };

        let (left, right) = tokio::join!(
            dispatch.render(&first, OutputFormat::Mmd, "main"),
            dispatch.render(&second, OutputFormat::Mmd, "main"),
        );
        assert_eq!(left.expect("first write").location, right.expect("second write").location);

        let written = std::fs::read_to_string(dir.path().join("main.mmd")).expect("artifact");
        assert!(written == first.source || written == second.source);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list output")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .filter(|name| name != "main.mmd")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn markup_formats_are_written_without_a_renderer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatch = RenderDispatch::new(RenderConfig::new(
            RenderBackend::Http {
                server_url: "http://127.0.0.1:9".to_string(),
            },
            dir.path(),
        ));
        let description = DiagramDescription {
            grammar: DiagramGrammar::PlantUml,
            source: "@startuml\n@enduml\n".to_string(),
        };

        let artifact = dispatch
            .render(&description, OutputFormat::Puml, "main")
            .await
            .expect("puml is written directly");

        assert_eq!(artifact.bytes, description.source.len());
        let written = std::fs::read_to_string(dir.path().join("main.puml")).expect("artifact");
        assert_eq!(written, description.source);
    }

    #[tokio::test]
    async fn mismatched_grammar_is_rejected_before_rendering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatch = RenderDispatch::new(RenderConfig::new(RenderBackend::default(), dir.path()));
        let description = DiagramDescription {
            grammar: DiagramGrammar::Mermaid,
            source: "erDiagram\n".to_string(),
        };

        let err = dispatch
            .render(&description, OutputFormat::Svg, "main")
            .await
            .expect_err("mermaid cannot become svg");
        assert!(matches!(err, RenderError::GrammarMismatch { .. }));
    }
}
